use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_state::config::{BackendConfig, SessionConfig};
use chat_state::conversations::Conversation;
use chat_state::messages::{MessageStatus, Role};
use chat_state::persistence::thread::LAST_CONVERSATION_KEY;
use chat_state::persistence::{FileStore, KeyValueStore, Theme};
use chat_state::session::{ChatSession, SessionEvent};
use chat_state::transport::HttpTransport;

const HELP: &str = "Commands: /new <title>, /open <id>, /list, /refresh, /retry <id>, \
/dismiss <id>, /stop, /theme <light|dark|system>, /logout, /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let backend = BackendConfig::from_env().context("backend configuration")?;
    let config = SessionConfig::from_env().context("session configuration")?;
    let generic_route = config.generic_route.clone();

    let kv: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&backend.store_path)
            .with_context(|| format!("opening {}", backend.store_path.display()))?,
    );
    let transport = Arc::new(HttpTransport::from_config(&backend));
    let session = Arc::new(ChatSession::new(transport, kv.clone(), config));

    eprintln!("💬 chat-state v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", backend.base_url);
    eprintln!("   {HELP}\n");

    // The backend has no conversation listing; the remembered one is all we know.
    if let Ok(Some(last)) = kv.get(LAST_CONVERSATION_KEY) {
        let now = chrono::Utc::now().timestamp_millis();
        session
            .load_conversations([Conversation::new("Restored conversation", now).with_id(last)])
            .await;
    }
    match session.restore_last_thread(&generic_route).await? {
        Some(restored) => eprintln!("   Resumed {}", restored.route),
        None => {
            let id = session.new_conversation("New chat", None).await?;
            eprintln!("   Started conversation {id}");
        }
    }

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::MessageUpserted { message } if message.role == Role::Assistant => {
                    println!("🤖 {}", message.content);
                }
                SessionEvent::MessageUpserted { message } if message.status == MessageStatus::Failed => {
                    println!("⚠️  not sent ({}), /retry {}", message.content, message.id);
                }
                SessionEvent::Notice { level, text } => eprintln!("[{level:?}] {text}"),
                _ => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        let result: anyhow::Result<()> = async {
            match command {
                "/quit" | "/exit" => return Ok(()),
                "/help" => eprintln!("{HELP}"),
                "/new" => {
                    let title = if arg.is_empty() { "New chat" } else { arg };
                    let id = session.new_conversation(title, None).await?;
                    eprintln!("Started conversation {id}");
                }
                "/open" => {
                    for message in session.open_conversation(arg).await? {
                        println!("[{}] {}: {}", message.status, message.role, message.content);
                    }
                }
                "/list" => {
                    for bucket in session.grouped_conversations(&chrono::Local::now()).await {
                        println!("{}", bucket.label);
                        for conv in bucket.conversations {
                            println!("  {} {} ({} unread)", conv.id, conv.title, conv.unread_count);
                        }
                    }
                }
                "/refresh" => {
                    if let Some(id) = session.active_conversation_id().await {
                        let count = session.refresh(&id).await?.len();
                        eprintln!("{count} messages");
                    }
                }
                "/retry" => {
                    session.retry(arg).await?;
                }
                "/dismiss" => session.dismiss(arg).await?,
                "/stop" => {
                    if let Some(id) = session.active_conversation_id().await {
                        session.stop_generation(&id).await;
                    }
                }
                "/theme" => {
                    let theme: Theme = arg.parse().map_err(anyhow::Error::msg)?;
                    session.persistence().set_theme_preference(theme);
                }
                "/logout" => session.logout().await,
                _ => {
                    session.submit(line).await?;
                }
            }
            Ok(())
        }
        .await;

        if matches!(command, "/quit" | "/exit") {
            break;
        }
        if let Err(e) = result {
            eprintln!("Error: {e}");
        }
    }

    Ok(())
}
