//! Command-line driver for the Nanum chat core.
//!
//! Every invocation opens the redb file, runs one command as the given
//! participant, prints the result and exits. Live subscriptions are opened,
//! read once and torn down within the command.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use nanum_chat::{
    Caller, ChatConfig, ChatError, ChatService, EnsureRoom, Message, Room, RoomId, RoomKind, RoomState,
    Session, pending_receipts, unread_count,
};
use nanum_store::{RedbStore, Store, StoreError};
use thiserror::Error;

/// Nanum chat core driver
#[derive(Parser, Debug)]
#[command(name = "nanum")]
#[command(about = "Drive the Nanum chat core against a local store")]
#[command(version)]
pub struct Cli {
    /// Path to the redb store file
    #[arg(long, default_value = "nanum.redb")]
    pub db: PathBuf,

    /// Participant id to act as. Omit to run anonymously
    #[arg(long = "as")]
    pub participant: Option<String>,

    /// Display name of the participant
    #[arg(long)]
    pub name: Option<String>,

    /// Email of the participant
    #[arg(long)]
    pub email: Option<String>,

    /// Grace window subtracted from joinedAt, in milliseconds
    #[arg(long, default_value = "1000")]
    pub grace_ms: u64,

    /// Number of newest messages a feed reads
    #[arg(long, default_value = "100")]
    pub window: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a room or enter an existing one
    Ensure {
        /// Target room
        #[command(flatten)]
        room: RoomArg,
        /// Title used when the room is created
        #[arg(long, default_value = "Chat room")]
        title: String,
        /// Room kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Owner of the underlying listing
        #[arg(long)]
        owner: Option<String>,
    },
    /// Send a message
    Send {
        /// Target room
        #[command(flatten)]
        room: RoomArg,
        /// Message text
        #[arg(long, default_value = "")]
        text: String,
        /// Image URL
        #[arg(long)]
        image: Option<String>,
    },
    /// Print visible messages and mark them read
    Read {
        /// Target room
        #[command(flatten)]
        room: RoomArg,
    },
    /// Leave a room
    Leave {
        /// Target room
        #[command(flatten)]
        room: RoomArg,
        /// Leave as the owner and close the room
        #[arg(long)]
        owner: bool,
    },
    /// List rooms the participant belongs to
    Rooms,
}

/// Room selector shared by subcommands.
#[derive(Args, Debug)]
pub struct RoomArg {
    /// Room id (`post_<listing>` for listing rooms)
    #[arg(long)]
    pub room: String,
}

/// Room kind flag.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KindArg {
    /// Group purchase
    Group,
    /// Free share
    Free,
}

impl From<KindArg> for RoomKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Group => Self::Group,
            KindArg::Free => Self::Free,
        }
    }
}

/// Errors a command can end with.
#[derive(Error, Debug)]
pub enum CliError {
    /// Chat core refused or failed.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Output could not be written.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Stable code printed before the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Chat(e) => e.code(),
            Self::Store(_) => "STORE",
            Self::Io(_) => "IO",
        }
    }
}

impl Cli {
    /// Chat configuration from the flags.
    pub fn config(&self) -> ChatConfig {
        ChatConfig {
            grace: Duration::from_millis(self.grace_ms),
            message_window: self.window,
            ..ChatConfig::default()
        }
    }

    /// Session from the identity flags.
    pub fn session(&self) -> Session {
        let Some(id) = &self.participant else {
            return Session::Anonymous;
        };
        let mut caller = Caller::new(id.as_str());
        if let Some(name) = &self.name {
            caller = caller.with_display_name(name);
        }
        if let Some(email) = &self.email {
            caller = caller.with_email(email);
        }
        Session::signed_in(caller)
    }
}

/// Open the store named by `cli` and run its command.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let store = RedbStore::open(&cli.db)?;
    tracing::debug!(db = %cli.db.display(), "store opened");
    execute(&ChatService::new(store, cli.config()), &cli.session(), &cli.command, out)
}

/// Run one command against `service`.
pub fn execute<S: Store>(
    service: &ChatService<S>,
    session: &Session,
    command: &Command,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Command::Ensure { room, title, kind, owner } => {
            let mut request = EnsureRoom::new(RoomId::new(room.room.as_str())?, title.as_str());
            if let Some(kind) = kind {
                request = request.kind((*kind).into());
            }
            if let Some(owner) = owner {
                request = request.owner(owner.as_str());
            }
            let outcome = service.ensure_room(session, &request)?;
            writeln!(out, "{}: {outcome:?}", request.room)?;
        },
        Command::Send { room, text, image } => {
            let id = service.send_message(session, &RoomId::new(room.room.as_str())?, text, image.as_deref())?;
            writeln!(out, "sent {id}")?;
        },
        Command::Read { room } => {
            let room = RoomId::new(room.room.as_str())?;
            read(service, session, &room, out)?;
        },
        Command::Leave { room, owner } => {
            let room = RoomId::new(room.room.as_str())?;
            let outcome = if *owner {
                service.leave_room_as_owner(session, &room)?
            } else {
                service.leave_room(session, &room)?
            };
            writeln!(out, "{room}: {outcome:?}")?;
        },
        Command::Rooms => {
            for room in my_rooms(service, session)? {
                let state = match room.state() {
                    RoomState::Open => "open",
                    RoomState::Closed { .. } => "closed",
                };
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    room.id,
                    room.title,
                    room.kind.as_str(),
                    state,
                    room.last_message.as_deref().unwrap_or_default()
                )?;
            }
        },
    }
    Ok(())
}

/// Print the caller's visible messages, then mark the pending ones read.
fn read<S: Store>(
    service: &ChatService<S>,
    session: &Session,
    room_id: &RoomId,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let caller = session.caller()?;
    let Some(room) = service.room(room_id)? else {
        return Err(ChatError::RoomNotFound(room_id.clone()).into());
    };

    let latest: Arc<Mutex<Option<Vec<Message>>>> = Arc::default();
    let sink = Arc::clone(&latest);
    let feed = service.subscribe_messages(session, room_id, move |messages| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(messages);
    })?;
    let delivered = latest.lock().unwrap_or_else(PoisonError::into_inner).take();
    feed.unsubscribe();

    let Some(messages) = delivered else {
        writeln!(out, "{room_id}: not joined")?;
        return Ok(());
    };

    let members = room.participants.len();
    for message in &messages {
        let sender = message.sender_name.as_deref().unwrap_or(message.sender_id.as_str());
        let image = message.image.as_deref().map(|url| format!(" [{url}]")).unwrap_or_default();
        writeln!(
            out,
            "{} {}: {}{} (unread {})",
            message.created_at,
            sender,
            message.text,
            image,
            unread_count(message, members)
        )?;
    }

    let pending = pending_receipts(&messages, &caller.id);
    let marked = service.mark_as_read(session, room_id, &pending)?;
    if !room.can_compose(&caller.id) {
        writeln!(out, "{room_id}: read only")?;
    }
    writeln!(out, "marked {marked} read")?;
    Ok(())
}

fn my_rooms<S: Store>(service: &ChatService<S>, session: &Session) -> Result<Vec<Room>, CliError> {
    let latest: Arc<Mutex<Vec<Room>>> = Arc::default();
    let sink = Arc::clone(&latest);
    let subscription = service.subscribe_my_rooms(session, move |rooms| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = rooms;
    })?;
    subscription.unsubscribe();
    let rooms = std::mem::take(&mut *latest.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(rooms)
}
