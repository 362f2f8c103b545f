//! `vmirror query`: ask the mirror a question from the command line.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::query::{QueryInterpreter, QueryResult, QueryRow};

pub async fn run_query(config: &Config, text: &str, session: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let interpreter = QueryInterpreter::new(pool.clone(), &config.query)
        .context("Invalid [query] name pattern")?;

    let result = interpreter.interpret_in(session, text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    pool.close().await;
    Ok(())
}

fn print_result(result: &QueryResult) {
    let filters = serde_json::to_string(&result.filters).unwrap_or_default();
    println!(
        "{} {} {}",
        result.entity_type.as_str(),
        result.action.as_str(),
        filters
    );

    let Some(rows) = &result.data else {
        println!("count: {}", result.count);
        return;
    };

    if rows.is_empty() {
        println!("No results.");
        return;
    }

    for row in rows {
        println!("  [{}] {:<32} {}", row.source_id(), row.name(), detail(row));
    }
    println!("{} result{}", result.count, if result.count == 1 { "" } else { "s" });
}

fn detail(row: &QueryRow) -> String {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    match row {
        QueryRow::Vm(vm) => format!(
            "{:<11} cluster={} host={}",
            or_dash(&vm.power_state),
            or_dash(&vm.cluster),
            or_dash(&vm.host)
        ),
        QueryRow::Host(h) => format!(
            "{:<11} cluster={} vms={}",
            or_dash(&h.connection_state),
            or_dash(&h.cluster),
            h.vm_count
        ),
        QueryRow::Datastore(ds) => format!(
            "{:<11} free={} vms={}",
            or_dash(&ds.datastore_type),
            ds.free_space.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string()),
            ds.vm_count
        ),
        QueryRow::Cluster(c) => format!("hosts={} vms={}", c.num_hosts, c.num_vms),
    }
}
