pub mod entry;
pub mod glossary;
pub mod insights;
pub mod post_trade;

pub use entry::ExplanationGenerator;
pub use glossary::{ConceptEntry, ConceptGlossary, Glossary};
pub use insights::build_analysis;
pub use post_trade::PostTradeAnalyzer;

/// Render a price with precision that suits its magnitude.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1000.0 {
        format!("{price:.2}")
    } else if abs >= 1.0 {
        format!("{price:.4}")
    } else {
        format!("{price:.8}")
    }
}

#[cfg(test)]
mod tests {
    use super::format_price;

    #[test]
    fn price_precision_scales() {
        assert_eq!(format_price(65_000.5), "65000.50");
        assert_eq!(format_price(104.0), "104.0000");
        assert_eq!(format_price(0.000123), "0.00012300");
    }
}
