//! Lists the first page of products for the account identified by
//! `STOCKBOOK_TOKEN`, logging to stdout and to a local file.
//!
//! ```sh
//! STOCKBOOK_TOKEN=... cargo run --example list_products
//! ```

use std::env;

use stockbook_api::params::Direction;
use stockbook_api::{ApiClient, ClientConfig, Credential, QueryParams};
use stockbook_entities::ProductService;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const TOKEN_ENV_VAR: &str = "STOCKBOOK_TOKEN";
const BASE_URL_ENV_VAR: &str = "STOCKBOOK_BASE_URL";
const DEFAULT_BASE_URL: &str = "https://api.stockbook.io/api/v2";
const LOG_FILE_NAME: &str = "list_products.log";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if dotenvy::dotenv().is_ok() {
        println!("Loaded .env file");
    }

    let file_appender = tracing_appender::rolling::never(".", LOG_FILE_NAME);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockbook_api=debug")),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let token = env::var(TOKEN_ENV_VAR)
        .map_err(|_| format!("{TOKEN_ENV_VAR} must be set to run this example"))?;
    let base_url = env::var(BASE_URL_ENV_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

    let client = ApiClient::new(
        ClientConfig::builder()
            .base_url(base_url)
            .credential(Credential::Bearer(token))
            .build(),
    )?;
    let products = ProductService::new(&client);

    let page = products
        .list(&QueryParams::new().limit(10).order_by("name", Direction::Asc))
        .await?;

    info!(total = page.meta.size, fetched = page.rows.len(), "listed products");
    for product in page.rows {
        info!(id = %product.id, name = %product.name, price = ?product.sale_price, "product");
    }

    Ok(())
}
