use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use dispatch_core::dispatch::DEFAULT_DISPATCH_RADIUS_KM;
use dispatch_core::maps::DEFAULT_AVERAGE_SPEED_KMH;
use dispatch_gateway::server::{Gateway, GatewayConfig};

#[derive(Debug, Parser)]
#[command(name = "dispatchd", about = "Ride dispatch and notification gateway")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "DISPATCHD_ADDR", default_value = "127.0.0.1:4520")]
    addr: String,

    /// Candidate search radius around the pickup point, in kilometers.
    #[arg(long, default_value_t = DEFAULT_DISPATCH_RADIUS_KM)]
    radius_km: f64,

    /// Average speed assumed by the fare estimator, in km/h.
    #[arg(long, default_value_t = DEFAULT_AVERAGE_SPEED_KMH)]
    average_speed_kmh: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let gateway = Gateway::new(GatewayConfig {
        dispatch_radius_km: args.radius_km,
        average_speed_kmh: args.average_speed_kmh,
    });

    let listener = TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %args.addr, radius_km = args.radius_km, "dispatchd listening");
    gateway.run(listener).await;
    Ok(())
}
