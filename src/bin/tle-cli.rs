use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use tle_forwarder::coap::CoapClient;

#[derive(Parser)]
#[command(name = "tle-cli")]
#[command(about = "Test client for the TLE forwarder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the HTTP front-end
    Http {
        #[arg(short, long, default_value = "http://localhost:8000")]
        url: String,

        /// Check the liveness route
        #[arg(long, conflicts_with_all = ["root", "satellite_id", "name", "group"])]
        health: bool,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Query the CoAP front-end
    Coap {
        #[arg(short, long, default_value = "localhost:5683")]
        addr: String,

        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// NORAD catalog number
    #[arg(long)]
    satellite_id: Option<String>,

    /// Satellite name
    #[arg(long)]
    name: Option<String>,

    /// Satellite group
    #[arg(long)]
    group: Option<String>,

    /// Request the service description instead of a lookup
    #[arg(long)]
    root: bool,
}

impl QueryArgs {
    /// Path and the first supplied parameter.
    fn request(&self) -> (&'static str, Option<(&'static str, String)>) {
        if self.root {
            return ("/", None);
        }
        let param = [
            ("satellite_id", &self.satellite_id),
            ("name", &self.name),
            ("group", &self.group),
        ]
        .into_iter()
        .find_map(|(key, value)| value.clone().map(|v| (key, v)));
        ("/tle", param)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Http { url, health, query } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            let request = if health {
                client.get(format!("{url}/health"))
            } else {
                let (path, param) = query.request();
                client.get(format!("{url}{path}")).query(&param.into_iter().collect::<Vec<_>>())
            };
            let res = request.send().await?;
            println!("Response Code: {}", res.status());
            println!("Response Body:\n{}", res.text().await?);
        }
        Commands::Coap { addr, query } => {
            let (path, param) = query.request();
            let params: Vec<String> = param.map(|(k, v)| format!("{k}={v}")).into_iter().collect();
            let mut client = CoapClient::connect(addr.as_str())
                .await?
                .with_timeout(Duration::from_secs(30));
            let res = client.get(path, &params).await?;
            println!("Response Code: {}", res.code);
            println!("Response Body:\n{}", res.text());
        }
    }

    Ok(())
}
