use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use agent_pricing::{config::Config, server};

/// Execute the models command
///
/// Token prices are shown per million tokens.
pub async fn execute(cfg: &Config) -> Result<()> {
    let service = server::build_service(cfg).await?;
    let models = service.list_models_with_pricing().await?;

    if models.is_empty() {
        println!("No pricing stored yet. Run `agent-pricing refresh` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("MODEL").fg(Color::Cyan),
        Cell::new("PROVIDER").fg(Color::Cyan),
        Cell::new("INPUT/M").fg(Color::Cyan),
        Cell::new("OUTPUT/M").fg(Color::Cyan),
        Cell::new("CACHE R/M").fg(Color::Cyan),
        Cell::new("CACHE W/M").fg(Color::Cyan),
        Cell::new("WEB SEARCH/M").fg(Color::Cyan),
        Cell::new("EXPIRED").fg(Color::Cyan),
    ]);

    for model in &models {
        let expired = if model.is_expired {
            Cell::new("yes").fg(Color::Red)
        } else {
            Cell::new("no")
        };
        table.add_row(vec![
            Cell::new(&model.canonical_model),
            Cell::new(&model.provider),
            Cell::new(format_price(model.input_price_per_million)),
            Cell::new(format_price(model.output_price_per_million)),
            Cell::new(format_price(model.cache_read_price_per_million)),
            Cell::new(format_price(model.cache_creation_price_per_million)),
            Cell::new(format_price(model.web_search_price_per_million)),
            expired,
        ]);
    }

    println!("{}", table);
    println!("{} models", models.len());
    Ok(())
}

fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("${:.4}", p),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(Some(3.0)), "$3.0000");
        assert_eq!(format_price(None), "-");
    }
}
