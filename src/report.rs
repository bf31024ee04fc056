use colored::Colorize;
use comfy_table::{
    presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement, Table,
};

use crate::monitor::{DerivedRow, Summary};

/// Format a token count with thousands separators, dropping a zero fraction.
pub fn format_count(value: f64) -> String {
    let formatted = if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    };
    let (sign, digits) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted.as_str()),
    };
    let (integer_part, decimal_part) = match digits.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (digits, None),
    };

    let grouped = integer_part
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(",");

    match decimal_part {
        Some(d) => format!("{sign}{grouped}.{d}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Abbreviate a mint or wallet address for narrow columns.
pub fn short_mint(mint: &str) -> String {
    let chars: Vec<char> = mint.chars().collect();
    if chars.len() <= 12 {
        return mint.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

pub fn snapshot_table(rows: &[DerivedRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Mint").add_attribute(Attribute::Bold),
        Cell::new("Balance").add_attribute(Attribute::Bold),
        Cell::new("Capacity").add_attribute(Attribute::Bold),
        Cell::new("Held %").add_attribute(Attribute::Bold),
    ]);

    for row in rows {
        let name = if row.placeholder {
            Cell::new(&row.name).fg(TColor::DarkGrey)
        } else {
            Cell::new(&row.name)
        };
        let held = match row.utilization() {
            Some(u) => {
                let c = if u >= 10.0 { TColor::Green } else { TColor::Red };
                Cell::new(format!("{u:.1}%"))
                    .set_alignment(CellAlignment::Right)
                    .fg(c)
            }
            None => Cell::new("-").set_alignment(CellAlignment::Right),
        };

        table.add_row(vec![
            name,
            Cell::new(&row.key),
            Cell::new(format_count(row.current_balance)).set_alignment(CellAlignment::Right),
            Cell::new(format_count(row.max_capacity)).set_alignment(CellAlignment::Right),
            held,
        ]);
    }
    table
}

pub fn print_snapshot(wallet: &str, rows: &[DerivedRow]) {
    let summary = Summary::from_rows(rows);
    println!("{} {}", "Wallet:".bold(), wallet.cyan());
    println!("{}", snapshot_table(rows));
    println!(
        "{} {}   {} {}   {} {}   {} {}",
        "Projects:".bold(),
        summary.tokens,
        "Total Tokens:".bold(),
        format_count(summary.total_capacity).cyan(),
        "In Circulation:".bold(),
        format_count(summary.in_circulation).green(),
        "Consumed:".bold(),
        format_count(summary.consumed).yellow(),
    );
}

pub fn print_failure(wallet: &str, error: &str) {
    eprintln!("{} {} ({})", "Error:".red().bold(), error, wallet);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{chart_rows, DisplayOrder};
    use crate::token::tests::token;
    use serde_json::json;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0.0), "0");
        assert_eq!(format_count(999.0), "999");
        assert_eq!(format_count(5000.0), "5,000");
        assert_eq!(format_count(1234567.5), "1,234,567.50");
        assert_eq!(format_count(-4200.0), "-4,200");
    }

    #[test]
    fn test_short_mint() {
        assert_eq!(short_mint("abc"), "abc");
        assert_eq!(
            short_mint("7jZj1fiUZXUQ3sKQcopbDnWZYAPkEu28Su32WCRoEfQn"),
            "7jZj…EfQn"
        );
    }

    #[test]
    fn test_snapshot_table_lists_rows_in_order() {
        let tokens = vec![
            token("B", "Beta", 10.0, json!(2), json!(50)),
            token("A", "Alpha", 100.0, json!(5), json!(1000)),
        ];
        let mut order = DisplayOrder::default();
        order.ensure(&tokens);
        let rows = chart_rows(&order, &tokens, "AT", &[]);

        let rendered = snapshot_table(&rows).to_string();
        let beta = rendered.find("Beta").unwrap();
        let alpha = rendered.find("Alpha").unwrap();
        assert!(beta < alpha);
        assert!(rendered.contains("5,000"));
        assert!(rendered.contains("10.0%"));
    }
}
