use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_notify::config::{self, Config};
use fleet_notify::jobs::trip_ready::{self, ReadyTicket};
use fleet_notify::models::notification::NotificationRecord;
use fleet_notify::notification::listener::{EventKind, LogRouter, PlatformEvent};
use fleet_notify::notification::push::marker_payload;
use fleet_notify::platform::simulated::SimulatedPlatform;
use fleet_notify::session::Session;
use fleet_notify::store::file::FileStore;
use fleet_notify::store::{KeyValueStore, PUSH_TOKEN_KEY};

mod cli;

use cli::{BadgeCommands, Commands, NotificationCommands, PushCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is opt-in via OTEL_EXPORTER_OTLP_ENDPOINT; stdout logging
    // is always on.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "fleet-notify"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fleet_notify=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = run(cfg, args.command).await;

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    opentelemetry::global::shutdown_tracer_provider();
    result
}

async fn run(cfg: Config, command: Commands) -> anyhow::Result<()> {
    let storage: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&cfg.storage_path)
            .await
            .with_context(|| format!("failed to open storage at {}", cfg.storage_path))?,
    );
    let device = Arc::new(if cfg.simulate_physical_device {
        SimulatedPlatform::physical(cfg.device_platform)
    } else {
        SimulatedPlatform::emulator(cfg.device_platform)
    });
    // badge, schedules and token carry over between invocations
    device
        .load_from(storage.as_ref())
        .await
        .context("failed to restore simulated device")?;
    let session = Session::new(&cfg, storage.clone(), device.clone())?;

    let outcome = dispatch(&session, storage.as_ref(), command).await;
    device
        .save_to(storage.as_ref())
        .await
        .context("failed to save simulated device")?;
    outcome
}

async fn dispatch(
    session: &Session,
    storage: &dyn KeyValueStore,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Login { token, user } => {
            let user = user
                .map(|u| serde_json::from_str(&u))
                .transpose()
                .context("--user must be valid JSON")?;
            let records = session.login(&token, user).await?;
            println!("✅ Logged in, {} notifications loaded", records.len());
        }
        Commands::Logout => {
            session.logout().await?;
            println!("✅ Logged out");
        }
        Commands::Notifications { command } => handle_notification_command(session, command).await?,
        Commands::Push { command } => handle_push_command(session, storage, command).await?,
        Commands::Badge { command } => match command {
            BadgeCommands::Get => println!("{}", session.push.get_badge_count().await?),
            BadgeCommands::Set { count } => {
                session.push.set_badge_count(count).await?;
                println!("✅ Badge set to {}", count);
            }
            BadgeCommands::Clear => {
                session.push.clear_badge_count().await?;
                println!("✅ Badge cleared");
            }
        },
        Commands::TripReady {
            ticket_id,
            ticket_number,
        } => {
            let today = chrono::Local::now().date_naive();
            session.cache.load().await;
            let ticket = ReadyTicket {
                id: ticket_id,
                ticket_number,
                scheduled_for: today,
                status: "approved".to_string(),
            };
            let created = trip_ready::notify_ready_tickets(&session.cache, &[ticket], today).await?;
            if created == 0 {
                println!("Already notified today for ticket {}", ticket_id);
            } else {
                println!("✅ Local notification created for ticket {}", ticket_id);
            }
        }
        Commands::SimulateTap { payload } => {
            let data = match serde_json::from_str::<serde_json::Value>(&payload)
                .context("--payload must be valid JSON")?
            {
                serde_json::Value::Object(map) => map,
                _ => anyhow::bail!("--payload must be a JSON object"),
            };
            let listener = session.listener(Arc::new(LogRouter));
            let link = listener
                .handle(PlatformEvent {
                    delivery_id: uuid::Uuid::new_v4().to_string(),
                    kind: EventKind::Tapped,
                    data,
                })
                .await;
            if let Some(link) = link {
                println!("→ {}", link.path());
            }
        }
    }

    Ok(())
}

async fn handle_notification_command(
    session: &Session,
    command: NotificationCommands,
) -> anyhow::Result<()> {
    match command {
        NotificationCommands::List => {
            let records = session.cache.load().await;
            if records.is_empty() {
                println!("No notifications.");
            }
            for record in &records {
                print_record(record);
            }
        }
        NotificationCommands::Unread { remote } => {
            let count = if remote {
                session.cache.refresh_unread_count_remote().await?
            } else {
                session.cache.load().await;
                session.cache.unread_count().await as u64
            };
            println!("{}", count);
        }
        NotificationCommands::Read { id } => {
            session.cache.mark_as_read(id).await?;
            println!("✅ Notification {} marked read", id);
        }
        NotificationCommands::ReadAll => {
            session.cache.load().await;
            session.cache.mark_all_as_read().await?;
            session.push.clear_badge_count().await?;
            println!("✅ All notifications marked read");
        }
        NotificationCommands::Delete { id } => {
            session.cache.delete_notification(id).await?;
            println!("✅ Notification {} deleted", id);
        }
    }
    Ok(())
}

async fn handle_push_command(
    session: &Session,
    storage: &dyn KeyValueStore,
    command: PushCommands,
) -> anyhow::Result<()> {
    match command {
        PushCommands::Register => match session.push.register_for_push().await? {
            Some(token) => {
                let platform = session
                    .push
                    .registration()
                    .map(|r| r.platform.as_str())
                    .unwrap_or("unknown");
                println!("✅ Registered on {} ({:?}): {}", platform, session.push.state(), token);
            }
            None => println!("Push notifications unavailable on this device"),
        },
        PushCommands::Unregister => {
            session.push.unregister_push().await?;
            println!("✅ Push token unregistered");
        }
        PushCommands::Token => {
            // each CLI run is a fresh process, so fall back to the persisted token
            let token = match session.push.get_push_token() {
                Some(t) => Some(t),
                None => storage.get_string(PUSH_TOKEN_KEY).await?,
            };
            match token {
                Some(t) => println!("{}", t),
                None => println!("No push token registered"),
            }
        }
        PushCommands::ScheduleDaily {
            hour,
            minute,
            title,
            body,
            kind,
        } => {
            match session
                .push
                .schedule_daily_notification(hour, minute, &title, &body, marker_payload(&kind))
                .await
            {
                Some(id) => println!("✅ Scheduled daily at {:02}:{:02} ({})", hour, minute, id),
                None => anyhow::bail!("failed to schedule daily notification"),
            }
        }
        PushCommands::SendLocal { title, body, delay } => {
            let id = session
                .push
                .schedule_local_notification(&title, &body, serde_json::Map::new(), delay)
                .await?;
            println!("✅ Local notification {}", id);
        }
    }
    Ok(())
}

fn print_record(record: &NotificationRecord) {
    let marker = if record.is_read() { " " } else { "●" };
    println!(
        "{} {:>6}  {:<18} {}  {}",
        marker,
        record.id,
        record.kind.as_str(),
        record.title,
        record.created_at.format("%Y-%m-%d %H:%M")
    );
}
