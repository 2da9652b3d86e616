//! # Seed and Demo Runner
//!
//! Seeds a demo tenant's products and walks one shift through the ledger:
//! open, a few sales, one cancellation, arqueo, close.
//!
//! ## Usage
//! ```bash
//! # Use till.toml / TILL_* settings
//! cargo run -p till-db --bin seed
//!
//! # Specify config file or database path
//! cargo run -p till-db --bin seed -- --config ./till.toml
//! cargo run -p till-db --bin seed -- --db ./data/till_dev.db
//!
//! # Print the arqueo as JSON
//! cargo run -p till-db --bin seed -- --json
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info,till=debug,sqlx=warn`).

use std::env;
use std::path::PathBuf;

use till_core::{
    CloseShiftRequest, Money, NewLineItem, NewPayment, NewSale, OpenShiftRequest, PaymentMethod,
    Product, Role, TenantContext,
};
use till_db::repository::product::generate_product_id;
use till_db::{TillConfig, TillService};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_TENANT: &str = "demo-tenant";

/// (name, stock, min_stock, price in cents)
const PRODUCTS: &[(&str, i64, i64, i64)] = &[
    ("Coca-Cola 600ml", 48, 12, 1800),
    ("Agua Natural 1L", 60, 12, 1200),
    ("Papas Clasicas", 30, 10, 1650),
    ("Galletas Maria", 25, 8, 2200),
    ("Cafe Americano", 200, 0, 3500),
    ("Pan Dulce", 6, 10, 900),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,till=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut as_json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--json" => as_json = true,
            "--help" | "-h" => {
                println!("Till Seed and Demo Runner");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform till.toml)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("      --json           Print the arqueo as JSON");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = TillConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    println!("Till Seed");
    println!("=========");
    println!("Database:     {}", config.database.path.display());
    println!("Stock policy: {:?}", config.ledger.stock_policy);
    println!();

    let till = TillService::from_config(&config).await?;
    let products = till.database().products();

    // Products
    let mut ids = Vec::with_capacity(PRODUCTS.len());
    for (name, stock, min_stock, price) in PRODUCTS {
        let product = Product {
            id: generate_product_id(),
            tenant_id: DEMO_TENANT.to_string(),
            name: name.to_string(),
            stock: *stock,
            min_stock: *min_stock,
        };
        products.insert(&product).await?;
        ids.push((product.id, Money::from_cents(*price)));
    }
    println!("✓ Seeded {} products", ids.len());

    // Shift
    let cashier = TenantContext::new(DEMO_TENANT, "demo-cashier", Role::Cashier);
    let shift = till
        .open_shift(
            &cashier,
            OpenShiftRequest {
                opening_amount: Money::from_cents(50_000),
                notes: Some("seed run".to_string()),
            },
        )
        .await?;
    println!("✓ Opened shift {} with {}", shift.id, shift.opening_amount);

    // Sales
    let line = |idx: usize, qty: i64| NewLineItem::new(ids[idx].0.as_str(), qty, ids[idx].1);

    let mut cash_sale = NewSale::new(shift.id.as_str(), vec![line(0, 2), line(2, 1)]);
    cash_sale.payments = vec![NewPayment::cash(Money::from_cents(5_250))];
    let first = till.create_sale(&cashier, cash_sale).await?;

    let mut split_sale = NewSale::new(shift.id.as_str(), vec![line(4, 3), line(5, 2)]);
    split_sale.tip = Money::from_cents(1_000);
    split_sale.payments = vec![
        NewPayment::cash(Money::from_cents(6_000)),
        NewPayment::with_reference(PaymentMethod::Card, Money::from_cents(7_300), "AUTH-000123"),
    ];
    let second = till.create_sale(&cashier, split_sale).await?;

    let mut mistaken = NewSale::new(shift.id.as_str(), vec![line(3, 4)]);
    mistaken.payments = vec![NewPayment::with_reference(
        PaymentMethod::Transfer,
        Money::from_cents(8_800),
        "SPEI-77",
    )];
    let third = till.create_sale(&cashier, mistaken).await?;
    till.cancel_sale(&cashier, &third.sale.id).await?;

    for detail in [&first, &second, &third] {
        println!(
            "✓ Sale {} total {} ({:?})",
            detail.sale.sale_number, detail.sale.total, detail.sale.payment_method
        );
    }
    println!("✓ Cancelled {}", third.sale.sale_number);

    // Arqueo
    let arqueo = till.compute_arqueo(&cashier, &shift.id).await?;
    println!();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&arqueo)?);
    } else {
        println!("Arqueo for shift {}", arqueo.shift_id);
        println!("  Completed sales: {}", arqueo.totals.sale_count);
        println!("  Sales total:     {}", arqueo.totals.total);
        for bucket in &arqueo.payments_by_method {
            println!(
                "  {:<16} {} ({} sales)",
                format!("{:?}:", bucket.method),
                bucket.total,
                bucket.sale_count
            );
        }
        for top in &arqueo.top_products {
            println!(
                "  Top: {} x{}",
                top.product_name.as_deref().unwrap_or(&top.product_id),
                top.quantity
            );
        }
        println!("  Expected cash:   {}", arqueo.expected_cash);
    }

    // Close one peso short
    let counted = arqueo.expected_cash - Money::from_cents(100);
    let closed = till
        .close_shift(
            &cashier,
            &shift.id,
            CloseShiftRequest {
                closing_amount: counted,
                notes: None,
            },
        )
        .await?;
    println!();
    println!(
        "✓ Closed shift: counted {}, difference {:?} ({:?})",
        counted,
        closed.difference,
        closed.variance()
    );

    let low = products.low_stock(DEMO_TENANT).await?;
    for product in &low {
        println!("⚠ Low stock: {} ({} left)", product.name, product.stock);
    }

    till.database().close().await;
    info!("Seed complete");

    Ok(())
}
