use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use agent_pricing::{
    config::Config,
    pricing::{CostRequest, PricingComponent},
    server,
};

use super::format_usd;
use crate::cli::CostArgs;

/// Execute the cost command
pub async fn execute(cfg: &Config, args: CostArgs) -> Result<()> {
    let service = server::build_service(cfg).await?;

    let request = CostRequest {
        model: args.model,
        runner_type: args.runner_type,
        input_tokens: args.input,
        output_tokens: args.output,
        cache_read_tokens: args.cache_read,
        cache_creation_tokens: args.cache_creation,
        web_search_requests: args.web_search,
        server_tool_uses: args.server_tool_use,
    };
    let calculation = service.calculate_cost(&request).await?;

    println!(
        "{} {} ({})",
        "Model:".bold(),
        calculation.canonical_model,
        calculation.provider
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("COMPONENT").fg(Color::Cyan),
        Cell::new("USAGE").fg(Color::Cyan),
        Cell::new("COST").fg(Color::Cyan),
        Cell::new("SOURCE").fg(Color::Cyan),
    ]);

    for component in PricingComponent::ALL {
        let count = request.count(component);
        if count == 0 {
            continue;
        }
        let source = calculation
            .sources
            .get(&component)
            .map_or("unknown", |s| s.as_str());
        table.add_row(vec![
            Cell::new(component.as_str()),
            Cell::new(count),
            Cell::new(format_usd(calculation.costs.get(component))),
            Cell::new(source),
        ]);
    }

    println!("{}", table);
    println!(
        "{} {}",
        "Total:".bold(),
        format_usd(calculation.total_cost).green()
    );
    if let Some(fetched_at) = calculation.pricing_fetched_at {
        println!("Pricing fetched at {}", fetched_at.to_rfc3339());
    }

    Ok(())
}
