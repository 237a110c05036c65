use clap::{Parser, Subcommand};

/// fleet-notify: notification cache and push channel tooling for fleet trips
#[derive(Parser)]
#[command(name = "fleet-notify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store an auth token and bootstrap the session
    Login {
        #[arg(long, env = "FLEET_AUTH_TOKEN")]
        token: String,
        /// Cached user profile as JSON
        #[arg(long)]
        user: Option<String>,
    },

    /// Unregister push and clear all session state
    Logout,

    /// Read and manage notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Push registration and local scheduling
    Push {
        #[command(subcommand)]
        command: PushCommands,
    },

    /// Application badge counter, kept in the storage file between runs
    Badge {
        #[command(subcommand)]
        command: BadgeCommands,
    },

    /// Notify that a trip ticket is ready to start today
    TripReady {
        #[arg(long)]
        ticket_id: i64,
        #[arg(long)]
        ticket_number: Option<String>,
    },

    /// Feed a tapped-notification payload through the listener pipeline
    SimulateTap {
        /// Notification data as JSON, e.g. '{"trip_ticket_id": 5}'
        #[arg(long)]
        payload: String,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// Load and print all notifications
    List,
    /// Print the unread count
    Unread {
        /// Ask the backend instead of counting the loaded list
        #[arg(long)]
        remote: bool,
    },
    /// Mark one notification read
    Read { id: i64 },
    /// Mark every notification read
    ReadAll,
    /// Delete a notification
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum PushCommands {
    /// Acquire a push token and register it with the backend
    Register,
    /// Invalidate the current push token
    Unregister,
    /// Print the persisted push token
    Token,
    /// Schedule a recurring daily notification
    ScheduleDaily {
        #[arg(long)]
        hour: u8,
        #[arg(long)]
        minute: u8,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Recurring-type marker; replaces any pending notification of the same kind
        #[arg(long, default_value = "daily_trip_check")]
        kind: String,
    },
    /// Fire a one-shot local notification
    SendLocal {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Delay in seconds (0 = now)
        #[arg(long, default_value = "0")]
        delay: u64,
    },
}

#[derive(Subcommand)]
pub enum BadgeCommands {
    Get,
    Set { count: u32 },
    Clear,
}
