//! Quota command - show a tenant's plan and usage.

use anyhow::Result;
use clap::Args;

use super::context::{self, Models};
use crate::types::QuotaStatus;

#[derive(Args)]
pub struct QuotaCmd {
    /// Print the snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

impl QuotaCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;
        let governance = context::open_governance(Models::Unused).await?;
        let status = governance.status(tenant).await.map_err(context::report)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print_status(&status);
        }
        Ok(())
    }
}

/// Human-readable quota table.
pub fn print_status(status: &QuotaStatus) {
    println!("Tenant: {}", status.tenant_id);
    println!("Plan:   {}", status.plan);
    println!();

    for d in &status.dimensions {
        let window = d
            .window
            .as_deref()
            .map(|w| format!("  [{}]", w))
            .unwrap_or_default();
        let marker = if d.is_over() { "  OVER" } else { "" };
        println!(
            "  {:<24} {:>10} / {:<8} {:>6.1}%{}{}",
            d.dimension.as_str(),
            d.dimension.format_amount(d.current),
            d.max,
            d.percentage,
            window,
            marker
        );
    }

    if let Some(ref last) = status.last_activity {
        println!();
        println!("Last activity: {}", last);
    }
}
