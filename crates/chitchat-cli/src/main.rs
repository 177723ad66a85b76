//! ChitChat terminal client.
//!
//! Usage:
//!   # Sign in (password from CHITCHAT_PASSWORD or --password)
//!   chitchat login --email a@b.com
//!
//!   # List chats, then open one interactively
//!   chitchat chats
//!   chitchat open 4
//!
//!   # Point at another backend
//!   CHITCHAT_API_URL=https://chat.example.com/api chitchat chats

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use chitchat_client::{
    ChatDirectory, ChatRoom, ClientConfig, ClientContext, ClientError, ClientEvent, EventName,
    filter_contacts, plan_new_chat, preview,
};
use chitchat_types::{ChatId, Credentials, ServerEvent, SignupRequest, User, UserId};

/// Terminal client for ChitChat.
#[derive(Parser, Debug)]
#[command(name = "chitchat")]
#[command(about = "Chat from the terminal")]
struct Args {
    /// REST base URL, including the /api prefix
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHITCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: String,
        /// Full name shown to other users
        #[arg(long)]
        name: String,
        #[arg(long, env = "CHITCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List chats with their latest message
    Chats,
    /// List people you can chat with
    Contacts {
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
    },
    /// Start a chat with one or more contacts
    NewChat {
        /// Contact ids
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Group name (required for more than one contact)
        #[arg(long)]
        name: Option<String>,
    },
    /// Open a chat: history, then live messages. `/quit` leaves.
    Open { chat_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::load().map_err(friendly)?;
    config.apply_overrides(args.api_url, None);
    debug!(api = %config.api_base_url, "using backend");
    let ctx = ClientContext::from_config(config).map_err(friendly)?;

    match args.command {
        Command::Login { email, password } => {
            let me = ctx
                .session()
                .login(&Credentials::new(email, password))
                .await
                .map_err(friendly)?;
            println!("Signed in as {me}");
        }
        Command::Signup { email, name, password } => {
            let request = SignupRequest {
                email,
                password,
                full_name: name,
            };
            let me = ctx.session().signup(&request).await.map_err(friendly)?;
            println!("Welcome, {me}");
        }
        Command::Logout => {
            ctx.session().logout();
            println!("Signed out");
        }
        Command::Whoami => {
            let me = require_session(&ctx).await?;
            println!("{me} (id {})", me.id);
        }
        Command::Chats => {
            let me = require_session(&ctx).await?;
            let directory = ChatDirectory::enter(&ctx);
            let chats = directory.refresh().await.map_err(friendly)?;
            if chats.is_empty() {
                println!("No chats yet. Start one with `chitchat new-chat <contact id>`.");
            }
            for chat in &chats {
                println!(
                    "[{}] {} ({}) | {}",
                    chat.id,
                    chat.title(Some(me.id)),
                    chat.chat_type,
                    preview(chat, Some(me.id))
                );
            }
        }
        Command::Contacts { search } => {
            let me = require_session(&ctx).await?;
            let contacts = ChatDirectory::enter(&ctx).contacts().await.map_err(friendly)?;
            for contact in filter_contacts(&contacts, Some(me.id), search.as_deref().unwrap_or("")) {
                let bot = if contact.is_bot { " [bot]" } else { "" };
                println!("[{}] {}{bot}", contact.id, contact);
            }
        }
        Command::NewChat { ids, name } => {
            require_session(&ctx).await?;
            let directory = ChatDirectory::enter(&ctx);
            let contacts = directory.contacts().await.map_err(friendly)?;
            let selected: Vec<UserId> = ids.into_iter().map(UserId::new).collect();
            let request = plan_new_chat(&selected, &contacts, name.as_deref()).map_err(friendly)?;
            let chat = directory.create_chat(&request).await.map_err(friendly)?;
            println!("Created {} chat {}", chat.chat_type, chat.id);
        }
        Command::Open { chat_id } => {
            let me = require_session(&ctx).await?;
            open_chat(&ctx, me, ChatId::new(chat_id)).await?;
        }
    }

    Ok(())
}

fn friendly(err: ClientError) -> anyhow::Error {
    anyhow!("{} ({err})", err.user_message())
}

/// Restore the stored session or fail with a hint.
async fn require_session(ctx: &ClientContext) -> Result<User> {
    match ctx.session().initialize().await.map_err(friendly)? {
        Some(me) => Ok(me),
        None => bail!("Not signed in. Run `chitchat login --email <email>` first."),
    }
}

async fn open_chat(ctx: &ClientContext, me: User, chat_id: ChatId) -> Result<()> {
    let room = ChatRoom::enter(ctx);
    room.load(chat_id).await.map_err(friendly)?;
    info!(%chat_id, "joined chat");

    if let Some(chat) = room.chat() {
        println!("== {} ==", chat.title(Some(me.id)));
    }
    let printed = Arc::new(Mutex::new(HashSet::new()));
    for message in room.messages() {
        print_message(&message, me.id, &printed);
    }

    let printed_live = Arc::clone(&printed);
    let me_id = me.id;
    let _messages = ctx.dispatcher().subscribe(EventName::NewMessage, move |event| {
        if let Some(ServerEvent::NewMessage(message)) = event.as_server() {
            if message.chat_id == chat_id {
                print_message(message, me_id, &printed_live);
            }
        }
    });
    let _typing = ctx.dispatcher().subscribe(EventName::TypingIndicator, move |event| {
        if let Some(ServerEvent::TypingIndicator { chat_id: typing_chat, user, is_typing: true }) =
            event.as_server()
        {
            if *typing_chat == chat_id && user.id != me_id {
                println!("  ({} is typing...)", user.display_name());
            }
        }
    });
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let _closed = ctx.dispatcher().subscribe(EventName::Disconnect, move |event| {
        if let ClientEvent::Disconnect { reason, .. } = event {
            let _ = closed_tx.send(reason.clone());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = room.send_message(line).await {
                    eprintln!("{}", e.user_message());
                    if matches!(e, ClientError::AuthRejected(_)) {
                        break;
                    }
                }
            }
            reason = closed_rx.recv() => {
                eprintln!("Connection closed: {}", reason.unwrap_or_default());
                break;
            }
        }
    }

    drop(room);
    Ok(())
}

fn print_message(message: &chitchat_types::Message, me: UserId, printed: &Mutex<HashSet<i64>>) {
    if !printed.lock().insert(message.id.get()) {
        return;
    }
    let who = if message.is_from(me) {
        "You".to_string()
    } else {
        message.sender_name()
    };
    println!("[{}] {who}: {}", message.timestamp.format("%H:%M"), message.content);
}
