//! Plan command - move a tenant to another plan tier.

use anyhow::Result;
use clap::Args;

use super::context::{self, Models};
use crate::types::QuotaDimension;

#[derive(Args)]
pub struct PlanCmd {
    /// Plan tier: free, basic or premium
    pub plan: String,
}

impl PlanCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;
        let governance = context::open_governance(Models::Unused).await?;

        let plan = governance
            .set_plan(tenant, &self.plan)
            .await
            .map_err(context::report)?;

        println!("Tenant {} is now on the {} plan.", tenant, plan.tier);
        for dimension in QuotaDimension::ALL {
            println!(
                "  {:<24} {}",
                dimension.as_str(),
                plan.limits.get(dimension)
            );
        }

        // A downgrade keeps existing usage, which may now exceed the limits.
        let status = governance.status(tenant).await.map_err(context::report)?;
        let over: Vec<_> = status.dimensions.iter().filter(|d| d.is_over()).collect();
        if !over.is_empty() {
            println!();
            println!("Over the new limits:");
            for d in over {
                println!(
                    "  {:<24} {} / {}",
                    d.dimension.as_str(),
                    d.dimension.format_amount(d.current),
                    d.max
                );
            }
        }

        Ok(())
    }
}
