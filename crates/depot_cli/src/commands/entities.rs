//! Local reads and queued writes per collection

use super::{truncate, Workspace};
use crate::{ClientAction, MovementAction, ProductAction, SaleAction};
use anyhow::Result;
use chrono::Utc;
use depot_common::{Client, Product, RecordedBy, StockMovement};

/// Locally unique id for a record created offline
fn new_id(prefix: &str) -> String {
    format!(
        "{}-{}-{:08x}",
        prefix,
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn report_queued(what: &str, id: &str, mutation_id: &str, workspace: &Workspace) -> Result<()> {
    eprintln!("✓ Added {} {}", what, id);
    eprintln!(
        "  queued {} ({} pending, run `depot sync` to push)",
        mutation_id,
        workspace.context.pending_sync_count()?
    );
    Ok(())
}

pub async fn cmd_clients(action: ClientAction) -> Result<()> {
    let workspace = Workspace::open()?;
    let clients = workspace.context.clients();

    match action {
        ClientAction::List { json } => {
            let items = clients.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            eprintln!("Clients ({}):", items.len());
            println!("{:<28} {:<30} {:<28} {:<14}", "ID", "Name", "Email", "Phone");
            println!("{}", "-".repeat(100));
            for client in items {
                let full_name = match &client.last_name {
                    Some(last) => format!("{} {}", client.name, last),
                    None => client.name.clone(),
                };
                println!(
                    "{:<28} {:<30} {:<28} {:<14}",
                    client.id,
                    truncate(&full_name, 28),
                    truncate(client.email.as_deref().unwrap_or("-"), 26),
                    client.phone.as_deref().unwrap_or("-")
                );
            }
        }
        ClientAction::Add {
            name,
            last_name,
            email,
            phone,
            document,
            address,
        } => {
            let mut client = Client::new(new_id("client"), name);
            client.last_name = last_name;
            client.email = email;
            client.phone = phone;
            client.document_id = document;
            client.address = address;

            let id = client.id.clone();
            let mutation_id = clients.add(client)?;
            report_queued("client", &id, &mutation_id, &workspace)?;
        }
    }
    Ok(())
}

pub async fn cmd_products(action: ProductAction) -> Result<()> {
    let workspace = Workspace::open()?;
    let products = workspace.context.products();

    match action {
        ProductAction::List { json } => {
            let items = products.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            eprintln!("Products ({}):", items.len());
            println!(
                "{:<28} {:<30} {:>10} {:>7}  {:<16}",
                "ID", "Name", "Price", "Stock", "Category"
            );
            println!("{}", "-".repeat(96));
            for product in items {
                let stock = if product.is_low_stock() {
                    format!("{}!", product.stock)
                } else {
                    product.stock.to_string()
                };
                println!(
                    "{:<28} {:<30} {:>10.2} {:>7}  {:<16}",
                    product.id,
                    truncate(&product.name, 28),
                    product.price,
                    stock,
                    product.category
                );
            }
        }
        ProductAction::Add {
            name,
            price,
            category,
            stock,
            min_stock,
            description,
        } => {
            if !price.is_finite() || price < 0.0 {
                anyhow::bail!("price must be a non-negative number, got {}", price);
            }
            let mut product = Product::new(new_id("product"), name, price);
            product.category = category;
            product.stock = stock;
            product.min_stock = min_stock;
            product.description = description;

            let id = product.id.clone();
            let mutation_id = products.add(product)?;
            report_queued("product", &id, &mutation_id, &workspace)?;
        }
    }
    Ok(())
}

pub async fn cmd_sales(action: SaleAction) -> Result<()> {
    let workspace = Workspace::open()?;

    match action {
        SaleAction::List { json } => {
            let items = workspace.context.sales().list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            eprintln!("Sales ({}):", items.len());
            println!(
                "{:<28} {:<28} {:>5} {:>10}  {}",
                "ID", "Client", "Lines", "Total", "Date"
            );
            println!("{}", "-".repeat(96));
            for sale in items {
                println!(
                    "{:<28} {:<28} {:>5} {:>10.2}  {}",
                    sale.id,
                    sale.client_id,
                    sale.lines.len(),
                    sale.total,
                    sale.date.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}

pub async fn cmd_movements(action: MovementAction) -> Result<()> {
    let workspace = Workspace::open()?;
    let movements = workspace.context.stock_movements();

    match action {
        MovementAction::List { json } => {
            let items = movements.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            eprintln!("Stock movements ({}):", items.len());
            println!(
                "{:<28} {:<28} {:<12} {:>8}  {}",
                "ID", "Product", "Kind", "Quantity", "Date"
            );
            println!("{}", "-".repeat(96));
            for movement in items {
                println!(
                    "{:<28} {:<28} {:<12} {:>8}  {}",
                    movement.id,
                    movement.product_id,
                    movement.kind.as_str(),
                    movement.quantity,
                    movement.date.format("%Y-%m-%d %H:%M")
                );
            }
        }
        MovementAction::Add {
            product_id,
            kind,
            quantity,
            reason,
            by,
        } => {
            if quantity == 0 {
                anyhow::bail!("quantity must be at least 1");
            }
            let movement = StockMovement {
                id: new_id("movement"),
                product_id,
                kind,
                quantity,
                reason,
                date: Utc::now(),
                recorded_by: RecordedBy {
                    uid: by.clone(),
                    email: by,
                },
            };

            let id = movement.id.clone();
            let mutation_id = movements.add(movement)?;
            report_queued("stock movement", &id, &mutation_id, &workspace)?;
        }
    }
    Ok(())
}
