use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use muvin_client::model::{CreateBookingForm, CreateReviewForm, HotelFilter};
use muvin_client::session::MemoryIdentityProvider;
use muvin_client::{AppController, ClientConfig, Deployment, HotelService, Store};
use muvin_types::{Identity, Principal};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

// Principal the demo signs in as.
const DEMO_PRINCIPAL: &str = "aaaaa-aa";

#[derive(Parser, Debug)]
#[command(name = "muvin-cli", version, about = "Muv In hotel booking client")]
struct Args {
    /// Serve fixture data when no gateway answers
    #[arg(long, overrides_with = "no_fixtures")]
    fixtures: bool,

    /// Fail reads instead of falling back to fixture data
    #[arg(long)]
    no_fixtures: bool,

    /// Gateway to try before any derived candidate
    #[arg(long)]
    host: Option<Url>,

    /// Origin the client is served from (for proxy candidates)
    #[arg(long)]
    origin: Option<Url>,

    /// local | production
    #[arg(long)]
    deployment: Option<Deployment>,

    #[arg(long)]
    canister_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the gateway and print the session state
    Status,
    /// List hotels, optionally narrowed
    Hotels {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long, default_value_t = false)]
        available: bool,
    },
    /// Show one hotel with its reviews
    Hotel { id: u64 },
    /// List reviews of a hotel
    Reviews { hotel_id: u64 },
    /// Platform-wide counters
    Stats,
    /// Sign in as a demo user, book a stay, review it and cancel it
    Demo {
        #[arg(long, default_value_t = 1)]
        hotel_id: u64,
        #[arg(long, default_value_t = 2)]
        nights: i64,
    },
}

impl Args {
    fn config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::from_env();
        if self.fixtures {
            cfg.fixture_fallback = true;
        }
        if self.no_fixtures {
            cfg.fixture_fallback = false;
        }
        if let Some(host) = &self.host {
            cfg.host_override = Some(host.clone());
        }
        if let Some(origin) = &self.origin {
            cfg.origin = Some(origin.clone());
        }
        if let Some(deployment) = self.deployment {
            cfg.deployment = deployment;
        }
        if let Some(id) = &self.canister_id {
            cfg.canister_id = id.clone();
        }
        cfg
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_demo(cfg: &ClientConfig, hotel_id: u64, nights: i64) -> Result<()> {
    if nights < 1 {
        bail!("--nights must be at least 1");
    }
    let principal: Principal = DEMO_PRINCIPAL.parse()?;
    let provider = Arc::new(MemoryIdentityProvider::with_identity(Identity::new(principal)));
    let service = Arc::new(HotelService::with_identity_provider(cfg, provider)?);
    let store = Arc::new(Store::new());
    let controller = AppController::new(service.clone(), store.clone());

    controller.start().await;
    if !controller.login().await {
        bail!("demo sign-in failed");
    }
    info!(principal = %service.principal(), "signed in");

    let check_in = Utc::now() + ChronoDuration::days(7);
    let booking = CreateBookingForm {
        hotel_id,
        check_in,
        check_out: check_in + ChronoDuration::days(nights),
        rooms_booked: 1,
    };
    let Some(booking_id) = controller.book_hotel(&booking).await else {
        bail!(
            "booking failed: {}",
            store.state().error.unwrap_or_else(|| "unknown error".into())
        );
    };
    info!(booking_id, "booked");

    let review = CreateReviewForm {
        hotel_id,
        rating: 5,
        comment: "Booked from the command line.".into(),
    };
    if controller.add_review(&review).await.is_none() {
        warn!("review was not accepted");
        controller.dismiss_error();
    }

    if !controller.cancel_booking(booking_id).await {
        warn!(booking_id, "cancellation was rejected");
    }

    print_json(&store.state())?;
    print_json(&service.telemetry())?;
    service.dispose().await;
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = args.config();

    if let Command::Demo { hotel_id, nights } = args.command {
        return run_demo(&cfg, hotel_id, nights).await;
    }

    let service = HotelService::from_config(&cfg)?;
    let session = service.init().await;
    if session.degraded {
        warn!(
            fixtures = cfg.fixture_fallback,
            "no gateway reachable; answers come from fixtures when enabled"
        );
    }

    match args.command {
        Command::Status => {
            print_json(&session)?;
        }
        Command::Hotels {
            search,
            location,
            min_price,
            max_price,
            available,
        } => {
            let filter = HotelFilter {
                search,
                location,
                min_price,
                max_price,
                available_only: available,
            };
            print_json(&filter.apply(&service.get_hotels().await))?;
        }
        Command::Hotel { id } => {
            let Some(hotel) = service.get_hotel(id).await else {
                bail!("hotel {id} not found");
            };
            print_json(&hotel)?;
            print_json(&service.get_hotel_reviews(id).await)?;
        }
        Command::Reviews { hotel_id } => {
            print_json(&service.get_hotel_reviews(hotel_id).await)?;
        }
        Command::Stats => match service.get_platform_stats().await {
            Some(stats) => print_json(&stats)?,
            None => bail!("platform stats unavailable"),
        },
        Command::Demo { .. } => {}
    }
    Ok(())
}
