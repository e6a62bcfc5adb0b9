use std::sync::Arc;

use clap::Parser;
use database::{friendship, profile, push_token, Database, DatabaseError, FriendStatus, Profile};
use push_dispatch::{HttpPushGateway, LoggingGateway, PushConfig, PushGateway};
use rider_app::RiderCore;
use rider_core::{AuthPrincipal, Coordinates, CoreConfig, RecordingPlatform};
use rider_safety::AlertRequest;
use tutorial::Catalog;

#[derive(Debug, Parser)]
#[command(name = "ride-drill")]
#[command(about = "Seed a rider with three emergency contacts and fire a test alert")]
struct Args {
    /// Rider id to sign in as
    #[arg(long, default_value = "drill-rider")]
    rider: String,

    /// Rider display name
    #[arg(long, default_value = "Alex")]
    name: String,

    /// Send a manual alert with this message instead of a fall alert
    #[arg(long)]
    manual: Option<String>,

    /// Latitude reported by the device (omit for unknown location)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude reported by the device
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Use throwaway in-memory databases instead of RIDER_DATABASE_URL
    #[arg(long)]
    in_memory: bool,

    /// Submit to the configured push gateway instead of logging
    #[arg(long)]
    live: bool,
}

const CONTACTS: [(&str, &str); 3] = [("drill-bea", "Bea"), ("drill-cam", "Cam"), ("drill-dee", "Dee")];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rider_app=info".parse()?)
                .add_directive("rider_safety=info".parse()?)
                .add_directive("push_dispatch=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = CoreConfig::from_env()?;
    if args.in_memory {
        config.database_url = "sqlite::memory:".to_string();
        config.local_store_url = "sqlite::memory:".to_string();
    }
    let push = PushConfig::from_env()?;
    let gateway: Arc<dyn PushGateway> = if args.live {
        Arc::new(HttpPushGateway::new(push.clone())?)
    } else {
        Arc::new(LoggingGateway)
    };

    let mut platform = RecordingPlatform::new().with_token(format!("drill-token-{}", args.rider));
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        platform = platform.with_location(Coordinates::new(lat, lon)?);
    }

    let remote = open(&config.database_url).await?;
    let local = open(&config.local_store_url).await?;
    seed(&remote, &args.rider).await?;

    let core = RiderCore::assemble(
        config,
        remote,
        local,
        push,
        gateway,
        Arc::new(platform),
        Catalog::default(),
    );

    let rider = core
        .sign_in(AuthPrincipal {
            user_id: args.rider.clone(),
            display_name: Some(args.name.clone()),
        })
        .await?;

    let existing: Vec<String> = core
        .contacts()
        .list()
        .await?
        .into_iter()
        .map(|c| c.friend_user_id)
        .collect();
    for (id, _) in CONTACTS {
        if existing.iter().any(|e| e == id) {
            continue;
        }
        if let Some(friend) = core.identity().get_profile(id).await? {
            core.contacts().add(&friend).await?;
        }
    }

    let location = core.alerts().locate().await;
    let request = match args.manual {
        Some(message) => AlertRequest::manual(location, message),
        None => AlertRequest::fall_detected(location),
    };
    let summary = core.alerts().trigger(request).await?;

    println!(
        "Alert {} from {}: notified {}/{}",
        summary.alert_id, rider.name, summary.notified_count, summary.total
    );
    for row in core.dispatch().delivery_log(&summary.alert_id).await? {
        println!(
            "  {:<12} {:<9} {}",
            row.recipient_user_id, row.delivery_status, row.title
        );
    }

    Ok(())
}

async fn open(url: &str) -> Result<Database, DatabaseError> {
    // Each memory connection is its own database.
    let db = if url.contains(":memory:") {
        Database::connect_with_pool_size(url, 1).await?
    } else {
        Database::connect(url).await?
    };
    db.migrate().await?;
    Ok(db)
}

/// Create the rider's friends with push tokens. Safe to run repeatedly.
async fn seed(db: &Database, rider_id: &str) -> Result<(), DatabaseError> {
    for (id, name) in CONTACTS {
        ignore_existing(profile::create_profile(db.pool(), &Profile::new(id, name)).await)?;
        ignore_existing(friendship::insert_edge(db.pool(), rider_id, id, FriendStatus::Accepted).await)?;
        ignore_existing(friendship::insert_edge(db.pool(), id, rider_id, FriendStatus::Accepted).await)?;
        push_token::upsert_token(db.pool(), id, &format!("drill-token-{}", id)).await?;
    }
    Ok(())
}

fn ignore_existing(result: Result<(), DatabaseError>) -> Result<(), DatabaseError> {
    match result {
        Err(DatabaseError::AlreadyExists { .. }) => Ok(()),
        other => other,
    }
}
