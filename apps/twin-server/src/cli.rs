use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "twin-server",
    version,
    about = "Battery digital twin ingestion and query server"
)]
pub struct Args {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
}
