use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use invtx::{export, summarize, AppConfig, Summary, Table, TransactionQuery, TransactionsClient};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("invtx=debug".parse().unwrap()),
        )
        .with_target(true)
        .init();

    info!("Starting invtx - investment transactions client");

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return;
        }
    };

    let client = match TransactionsClient::new(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build client: {}", e);
            return;
        }
    };

    // Ctrl-C flips the flag; fetch loops notice it between pages
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling after the current page");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    // Each scenario is independent; a failure is reported and the next one
    // still runs
    info!("Exemple 1: transactions Investissements et PEA");
    if let Err(e) = investment_overview(&client, &cancel).await {
        error!("Investment overview failed: {}", e);
    }
    if cancel.load(Ordering::SeqCst) {
        return;
    }

    info!("Exemple 2: transactions PEA (filtre par description)");
    if let Err(e) = pea_transactions(&client, &cancel).await {
        error!("PEA listing failed: {}", e);
    }
    if cancel.load(Ordering::SeqCst) {
        return;
    }

    info!("Exemple 3: transactions PEA du dernier mois");
    if let Err(e) = pea_last_month(&client, &cancel).await {
        error!("Last-month listing failed: {}", e);
    }
    if cancel.load(Ordering::SeqCst) {
        return;
    }

    info!("Exemple 4: export CSV");
    if let Err(e) = export_investments(&client, &cancel, Path::new("mes_investissements.csv")).await
    {
        error!("CSV export failed: {}", e);
    }

    info!("Done");
}

/// Fetch every Investissements/PEA transaction and print the full report
async fn investment_overview(
    client: &TransactionsClient,
    cancel: &AtomicBool,
) -> Result<(), String> {
    let query = TransactionQuery::new().with_categories(["Investissements", "PEA"]);
    let (records, server_summary) = client
        .fetch_all_with_summary(&query, cancel)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(s) = &server_summary {
        println!(
            "Succès! {} transaction(s) au total, montant net {:.2} €",
            s.total_transactions, s.net_total
        );
        if !s.categories.is_empty() {
            println!("Catégories: {}", s.categories.join(", "));
        }
    }
    print_report(&summarize(&records));
    Ok(())
}

/// Keyword search on the description, most recent first
async fn pea_transactions(client: &TransactionsClient, cancel: &AtomicBool) -> Result<(), String> {
    let query = TransactionQuery::new()
        .with_categories(["Investissements"])
        .with_description_filter("PEA");
    let records = client
        .fetch_all(&query, cancel)
        .await
        .map_err(|e| e.to_string())?;

    match records.first() {
        Some(tx) => println!(
            "Première transaction PEA: {} | {} | {:.2} €",
            tx.value_date, tx.description, tx.amount
        ),
        None => println!("Aucune transaction PEA"),
    }
    Ok(())
}

/// Same search restricted to the last 30 days
async fn pea_last_month(client: &TransactionsClient, cancel: &AtomicBool) -> Result<(), String> {
    let today = Utc::now().date_naive();
    let query = TransactionQuery::new()
        .with_categories(["Investissements"])
        .with_description_filter("PEA")
        .with_date_range(today - Duration::days(30), today);
    let records = client
        .fetch_all(&query, cancel)
        .await
        .map_err(|e| e.to_string())?;

    println!(
        "{} transaction(s) PEA sur les 30 derniers jours",
        records.len()
    );
    Ok(())
}

/// Fetch and write the investment transactions to a CSV file
async fn export_investments(
    client: &TransactionsClient,
    cancel: &AtomicBool,
    path: &Path,
) -> Result<(), String> {
    let query = TransactionQuery::new()
        .with_categories(["Investissements"])
        .with_description_filter("PEA");
    let records = client
        .fetch_all(&query, cancel)
        .await
        .map_err(|e| e.to_string())?;

    export::export_csv(&records, path).map_err(|e| e.to_string())?;
    println!("Transactions exportées vers {}", path.display());
    Ok(())
}

/// Print the aggregate report with per-category and per-account tables
fn print_report(summary: &Summary) {
    println!("{} transaction(s) récupérée(s)", summary.total_count);
    println!(
        "  Dépenses:  {} ({:.2} €)",
        summary.expense_count, summary.total_expenses
    );
    println!(
        "  Revenus:   {} ({:.2} €)",
        summary.income_count, summary.total_income
    );
    println!(
        "  Virements: {} ({:.2} €, frais {:.2} €)",
        summary.transfer_count, summary.total_transfers, summary.total_transfer_fees
    );
    println!("  Total net: {:.2} €", summary.net_total);

    if !summary.by_category.is_empty() {
        let mut table = Table::new(vec!["Catégorie", "Nb", "Total", "Dépenses", "Revenus"]);
        for (name, totals) in &summary.by_category {
            table.add_row(vec![
                name.clone(),
                totals.count.to_string(),
                format!("{:.2}", totals.total),
                format!("{:.2}", totals.expenses),
                format!("{:.2}", totals.income),
            ]);
        }
        println!("\nPar catégorie:\n{}", table.render());
    }

    if !summary.by_account.is_empty() {
        let mut table = Table::new(vec!["Compte", "Nb", "Dépenses", "Revenus", "Virements"]);
        for (name, totals) in &summary.by_account {
            table.add_row(vec![
                name.clone(),
                totals.count.to_string(),
                format!("{:.2}", totals.expenses),
                format!("{:.2}", totals.income),
                format!("{:.2}", totals.transfers),
            ]);
        }
        println!("Par compte:\n{}", table.render());
    }
}
