use log::{info, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::algo::literal::{self, Literal};
use crate::algo::text;

/// Stable identifier of a catalog entry, assigned at load time.
pub type EntryId = usize;

/// One raw dataset row. Column-name aliases match the source dataset; every
/// numeric field tolerates numeric-looking strings and degrades to `None`
/// otherwise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cuisines: Option<String>,
    #[serde(default)]
    pub establishment: Option<String>,
    #[serde(default)]
    pub highlights: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub votes: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub aggregate_rating: Option<f64>,
    #[serde(default, alias = "Menu")]
    pub menu: Option<String>,
    #[serde(default, alias = "Food Sentiments")]
    pub food_sentiments: Option<String>,
}

/// One menu item, as listed in an entry's menu field. `item` keeps its
/// original casing; matching lower-cases at comparison time.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub item: String,
    pub veg_status: String,
    pub price: f64,
}

/// Review sentiment aggregated over an entry's dishes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SentimentSummary {
    /// positive / (positive + negative), or 0 with no reviews.
    pub positive_ratio: f64,
    pub total_reviews: u32,
}

/// A restaurant after loading: raw attributes plus every derived field the
/// engine scores on. Immutable once the catalog is built.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: EntryId,
    pub name: String,
    /// Trimmed name used for fuzzy matching; an empty name becomes a
    /// placeholder that can never match a real query.
    pub cleaned_name: String,
    /// Lower-cased name with branch/location qualifiers stripped; equal
    /// base names mark branches of one chain.
    pub base_name: String,
    pub address: Option<String>,
    pub cuisines: Option<String>,
    pub establishment: Option<String>,
    pub highlights: Option<String>,
    pub votes: Option<u32>,
    pub rating: Option<f64>,
    pub menu: Vec<MenuItem>,
    /// Mean of positive menu prices, 0 without any.
    pub avg_price: f64,
    pub sentiment: SentimentSummary,
    /// Min-max scaled over entries with votes; absent votes read as 0.
    pub normalized_votes: f64,
    pub normalized_avg_price: f64,
    /// Lower-cased descriptive text feeding the feature similarity index.
    pub combined_feature_text: String,
    /// Lower-cased space-joined menu item names feeding the menu index.
    pub menu_text: String,
}

/// Immutable id-addressed arena of every loaded restaurant.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build the catalog from raw rows. Malformed embedded fields degrade to
    /// empty defaults with a warning; this never fails on bad row data.
    pub fn load(records: Vec<RawRecord>) -> Self {
        let mut entries: Vec<CatalogEntry> = records
            .into_par_iter()
            .enumerate()
            .map(|(id, raw)| derive_entry(id, raw))
            .collect();

        let votes: Vec<Option<f64>> = entries.iter().map(|e| e.votes.map(f64::from)).collect();
        // avg_price has no gaps; an empty menu already reads as 0.
        let prices: Vec<Option<f64>> = entries.iter().map(|e| Some(e.avg_price)).collect();
        let norm_votes = min_max_normalize(&votes);
        let norm_prices = min_max_normalize(&prices);
        for (entry, (nv, np)) in entries
            .iter_mut()
            .zip(norm_votes.into_iter().zip(norm_prices))
        {
            entry.normalized_votes = nv;
            entry.normalized_avg_price = np;
        }

        info!("catalog loaded: {} restaurants", entries.len());
        Catalog { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &CatalogEntry {
        &self.entries[id]
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }
}

#[derive(Debug, Error)]
enum MalformedField {
    #[error(transparent)]
    Syntax(#[from] literal::ParseError),
    #[error("value does not have the expected structure")]
    Structure,
}

fn derive_entry(id: EntryId, raw: RawRecord) -> CatalogEntry {
    let trimmed = raw.name.trim();
    let cleaned_name = if trimmed.is_empty() {
        "\\".to_string()
    } else {
        trimmed.to_string()
    };
    let base_name = base_name(&raw.name);

    let menu = match raw.menu.as_deref() {
        Some(s) if !s.trim().is_empty() => match parse_menu(s) {
            Ok(items) => items,
            Err(err) => {
                warn!("dropping malformed menu for {:?}: {err}", raw.name);
                Vec::new()
            }
        },
        _ => Vec::new(),
    };
    let sentiment = match raw.food_sentiments.as_deref() {
        Some(s) if !s.trim().is_empty() => match parse_sentiments(s) {
            Ok(summary) => summary,
            Err(err) => {
                warn!("dropping malformed sentiment data for {:?}: {err}", raw.name);
                SentimentSummary::default()
            }
        },
        _ => SentimentSummary::default(),
    };

    let positive_prices: Vec<f64> = menu.iter().map(|m| m.price).filter(|p| *p > 0.0).collect();
    let avg_price = if positive_prices.is_empty() {
        0.0
    } else {
        positive_prices.iter().sum::<f64>() / positive_prices.len() as f64
    };

    let combined_feature_text = combined_feature_text(&raw, avg_price);
    let menu_text = menu
        .iter()
        .map(|m| m.item.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    CatalogEntry {
        id,
        name: raw.name,
        cleaned_name,
        base_name,
        address: raw.address,
        cuisines: raw.cuisines,
        establishment: raw.establishment,
        highlights: raw.highlights,
        votes: raw.votes.map(|v| v.max(0.0) as u32),
        rating: raw.aggregate_rating,
        menu,
        avg_price,
        sentiment,
        normalized_votes: 0.0,
        normalized_avg_price: 0.0,
        combined_feature_text,
        menu_text,
    }
}

/// Branch/location qualifiers stripped in order: standalone "branch" and
/// "outlet" words, everything from the first dash, parenthesized text,
/// everything from the first comma, and trailing ordinal suffixes.
static BASE_NAME_STRIPS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bbranch\b",
        r"\boutlet\b",
        r"-.*$",
        r"\(.*\)",
        r",.*$",
        r"\d+(?:st|nd|rd|th).*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn base_name(name: &str) -> String {
    let mut base = name.to_lowercase();
    for re in BASE_NAME_STRIPS.iter() {
        base = re.replace_all(&base, "").into_owned();
    }
    base.trim().to_string()
}

fn combined_feature_text(raw: &RawRecord, avg_price: f64) -> String {
    let mut parts: Vec<&str> = [
        raw.cuisines.as_deref(),
        raw.address.as_deref(),
        raw.establishment.as_deref(),
        raw.highlights.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if let Some(tier) = price_tier(avg_price) {
        parts.push(tier);
    }
    text::strip_non_alphanumeric(&parts.join(" ").to_lowercase())
}

fn price_tier(avg_price: f64) -> Option<&'static str> {
    if avg_price <= 0.0 {
        return None;
    }
    Some(if avg_price < 300.0 {
        "budget"
    } else if avg_price < 600.0 {
        "mid_range"
    } else {
        "expensive"
    })
}

/// Menu encoding: `{'Item Name': ['Veg', 250.0], ...}` with tuples accepted
/// in place of lists. Any deviation fails the whole field.
fn parse_menu(raw: &str) -> Result<Vec<MenuItem>, MalformedField> {
    let parsed = literal::parse(raw)?;
    let pairs = parsed.as_dict().ok_or(MalformedField::Structure)?;
    let mut items = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let item = key.as_str().ok_or(MalformedField::Structure)?;
        let details = value.as_list().ok_or(MalformedField::Structure)?;
        let [status, price] = details else {
            return Err(MalformedField::Structure);
        };
        let veg_status = status.as_str().ok_or(MalformedField::Structure)?;
        let price = literal_number(price).ok_or(MalformedField::Structure)?;
        items.push(MenuItem {
            item: item.to_string(),
            veg_status: veg_status.to_string(),
            price,
        });
    }
    Ok(items)
}

/// Sentiment encoding: `{'dish': {'positive': N, 'negative': M}, ...}`.
/// Missing counts read as 0; a non-mapping dish value or a non-numeric
/// count fails the field.
fn parse_sentiments(raw: &str) -> Result<SentimentSummary, MalformedField> {
    let parsed = literal::parse(raw)?;
    let pairs = parsed.as_dict().ok_or(MalformedField::Structure)?;
    let mut positive = 0.0;
    let mut negative = 0.0;
    for (_, counts) in pairs {
        let counts = counts.as_dict().ok_or(MalformedField::Structure)?;
        for (key, value) in counts {
            match key.as_str() {
                Some("positive") => positive += value.as_f64().ok_or(MalformedField::Structure)?,
                Some("negative") => negative += value.as_f64().ok_or(MalformedField::Structure)?,
                _ => {}
            }
        }
    }
    let total = positive + negative;
    Ok(SentimentSummary {
        positive_ratio: if total > 0.0 { positive / total } else { 0.0 },
        total_reviews: total.max(0.0) as u32,
    })
}

/// Numbers may arrive as literals or numeric strings.
fn literal_number(value: &Literal) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Min-max scale the present values; absent values stay out of the min/max
/// and read as 0 afterwards.
fn min_max_normalize(values: &[Option<f64>]) -> Vec<f64> {
    let min = values.iter().flatten().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().flatten().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|v| v.map_or(0.0, |v| (v - min) / (max - min)))
        .collect()
}

fn flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            ..RawRecord::default()
        }
    }

    #[test]
    fn base_name_strips_qualifiers() {
        assert_eq!(base_name("Cafe X - MG Road"), "cafe x");
        assert_eq!(base_name("Cafe X (Indiranagar)"), "cafe x");
        assert_eq!(base_name("Cafe X, Koramangala"), "cafe x");
        assert_eq!(base_name("Cafe X Branch"), "cafe x");
        assert_eq!(base_name("Cafe X Outlet"), "cafe x");
        assert_eq!(base_name("Cafe X 4th Block"), "cafe x");
    }

    #[test]
    fn base_name_combined_qualifiers() {
        assert_eq!(base_name("Truffles Branch (Koramangala), 5th Block"), "truffles");
    }

    #[test]
    fn base_name_lowercases() {
        assert_eq!(base_name("TRUFFLES"), "truffles");
    }

    #[test]
    fn cleaned_name_guards_empty() {
        let catalog = Catalog::load(vec![record(""), record("   ")]);
        assert_eq!(catalog.entry(0).cleaned_name, "\\");
        assert_eq!(catalog.entry(1).cleaned_name, "\\");
    }

    #[test]
    fn cleaned_name_trims() {
        let catalog = Catalog::load(vec![record("  Truffles  ")]);
        assert_eq!(catalog.entry(0).cleaned_name, "Truffles");
        assert_eq!(catalog.entry(0).name, "  Truffles  ");
    }

    #[test]
    fn ids_are_sequential() {
        let catalog = Catalog::load(vec![record("A"), record("B"), record("C")]);
        let ids: Vec<EntryId> = catalog.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn menu_parses_typed_items() {
        let mut raw = record("Cafe");
        raw.menu = Some("{'Veg Burger': ['Veg', 250.0], 'Wings': ('Non-Veg', 350)}".into());
        let catalog = Catalog::load(vec![raw]);
        let entry = catalog.entry(0);
        assert_eq!(
            entry.menu,
            vec![
                MenuItem {
                    item: "Veg Burger".into(),
                    veg_status: "Veg".into(),
                    price: 250.0
                },
                MenuItem {
                    item: "Wings".into(),
                    veg_status: "Non-Veg".into(),
                    price: 350.0
                },
            ]
        );
        assert_eq!(entry.menu_text, "veg burger wings");
        assert_eq!(entry.avg_price, 300.0);
    }

    #[test]
    fn malformed_menu_degrades_to_empty() {
        let mut raw = record("Cafe");
        raw.menu = Some("{'Burger': ['Veg'".into());
        let catalog = Catalog::load(vec![raw]);
        assert!(catalog.entry(0).menu.is_empty());
        assert_eq!(catalog.entry(0).avg_price, 0.0);
    }

    #[test]
    fn menu_with_wrong_shape_degrades() {
        let mut raw = record("Cafe");
        raw.menu = Some("{'Burger': 250.0}".into());
        let catalog = Catalog::load(vec![raw]);
        assert!(catalog.entry(0).menu.is_empty());
    }

    #[test]
    fn menu_details_require_exactly_two_fields() {
        let mut extras = record("Extras");
        extras.menu = Some("{'Burger': ['Veg', 250.0, 'large']}".into());
        let mut short = record("Short");
        short.menu = Some("{'Burger': ['Veg']}".into());
        let catalog = Catalog::load(vec![extras, short]);
        assert!(catalog.entry(0).menu.is_empty());
        assert!(catalog.entry(1).menu.is_empty());
    }

    #[test]
    fn deeply_nested_menu_degrades() {
        let mut raw = record("Cafe");
        raw.menu = Some(format!("{{'Dish': {}1{}}}", "[".repeat(500), "]".repeat(500)));
        let catalog = Catalog::load(vec![raw]);
        assert!(catalog.entry(0).menu.is_empty());
    }

    #[test]
    fn menu_price_accepts_numeric_string() {
        let mut raw = record("Cafe");
        raw.menu = Some("{'Burger': ['Veg', '250']}".into());
        let catalog = Catalog::load(vec![raw]);
        assert_eq!(catalog.entry(0).menu[0].price, 250.0);
    }

    #[test]
    fn avg_price_ignores_non_positive() {
        let mut raw = record("Cafe");
        raw.menu = Some("{'A': ['Veg', 0], 'B': ['Veg', -5], 'C': ['Veg', 100]}".into());
        let catalog = Catalog::load(vec![raw]);
        assert_eq!(catalog.entry(0).avg_price, 100.0);
    }

    #[test]
    fn sentiments_aggregate_across_dishes() {
        let mut raw = record("Cafe");
        raw.food_sentiments =
            Some("{'burger': {'positive': 30, 'negative': 10}, 'fries': {'positive': 10}}".into());
        let catalog = Catalog::load(vec![raw]);
        let s = catalog.entry(0).sentiment;
        assert_eq!(s.positive_ratio, 0.8);
        assert_eq!(s.total_reviews, 50);
    }

    #[test]
    fn malformed_sentiments_degrade_to_zero() {
        let mut raw = record("Cafe");
        raw.food_sentiments = Some("{'burger': 12}".into());
        let catalog = Catalog::load(vec![raw]);
        assert_eq!(catalog.entry(0).sentiment, SentimentSummary::default());
    }

    #[test]
    fn non_numeric_sentiment_count_degrades() {
        let mut raw = record("Cafe");
        raw.food_sentiments = Some("{'burger': {'positive': 'many', 'negative': 2}}".into());
        let catalog = Catalog::load(vec![raw]);
        assert_eq!(catalog.entry(0).sentiment, SentimentSummary::default());
    }

    #[test]
    fn missing_fields_default_cleanly() {
        let catalog = Catalog::load(vec![record("Plain")]);
        let entry = catalog.entry(0);
        assert!(entry.menu.is_empty());
        assert_eq!(entry.sentiment.total_reviews, 0);
        assert_eq!(entry.avg_price, 0.0);
        assert_eq!(entry.combined_feature_text, "");
        assert_eq!(entry.menu_text, "");
    }

    #[test]
    fn feature_text_is_lowercase_alnum() {
        let mut raw = record("Cafe");
        raw.cuisines = Some("North Indian, Chinese".into());
        raw.address = Some("12, MG Road".into());
        raw.highlights = Some("['Wifi', 'Rooftop']".into());
        let catalog = Catalog::load(vec![raw]);
        let text = &catalog.entry(0).combined_feature_text;
        assert!(text.contains("north indian"));
        assert!(text.contains("mg road"));
        assert!(text.contains("wifi"));
        assert!(!text.contains(','));
        assert!(!text.contains('['));
        assert!(!text.chars().any(|c| c.is_uppercase()));
    }

    #[test]
    fn feature_text_includes_price_tier() {
        let mut cheap = record("Cheap");
        cheap.menu = Some("{'A': ['Veg', 100]}".into());
        let mut mid = record("Mid");
        mid.menu = Some("{'A': ['Veg', 400]}".into());
        let mut posh = record("Posh");
        posh.menu = Some("{'A': ['Veg', 900]}".into());
        let catalog = Catalog::load(vec![cheap, mid, posh]);
        assert!(catalog.entry(0).combined_feature_text.contains("budget"));
        assert!(catalog.entry(1).combined_feature_text.contains("mid range"));
        assert!(catalog.entry(2).combined_feature_text.contains("expensive"));
    }

    #[test]
    fn price_tier_boundaries() {
        assert_eq!(price_tier(0.0), None);
        assert_eq!(price_tier(299.99), Some("budget"));
        assert_eq!(price_tier(300.0), Some("mid_range"));
        assert_eq!(price_tier(599.99), Some("mid_range"));
        assert_eq!(price_tier(600.0), Some("expensive"));
    }

    #[test]
    fn votes_normalize_min_max() {
        let mut a = record("A");
        a.votes = Some(0.0);
        let mut b = record("B");
        b.votes = Some(50.0);
        let mut c = record("C");
        c.votes = Some(100.0);
        let catalog = Catalog::load(vec![a, b, c]);
        assert_eq!(catalog.entry(0).normalized_votes, 0.0);
        assert_eq!(catalog.entry(1).normalized_votes, 0.5);
        assert_eq!(catalog.entry(2).normalized_votes, 1.0);
    }

    #[test]
    fn all_equal_values_normalize_to_zero() {
        let mut a = record("A");
        a.votes = Some(77.0);
        let mut b = record("B");
        b.votes = Some(77.0);
        let catalog = Catalog::load(vec![a, b]);
        assert_eq!(catalog.entry(0).normalized_votes, 0.0);
        assert_eq!(catalog.entry(1).normalized_votes, 0.0);
    }

    #[test]
    fn missing_votes_treated_as_zero() {
        let mut a = record("A");
        a.votes = Some(100.0);
        let b = record("B");
        let catalog = Catalog::load(vec![a, b]);
        assert_eq!(catalog.entry(1).votes, None);
        assert_eq!(catalog.entry(1).normalized_votes, 0.0);
        // The single present value is a degenerate scale and reads as 0 too.
        assert_eq!(catalog.entry(0).normalized_votes, 0.0);
    }

    #[test]
    fn vote_scale_ignores_missing_votes() {
        let mut a = record("A");
        a.votes = Some(100.0);
        let mut b = record("B");
        b.votes = Some(200.0);
        let c = record("C");
        let catalog = Catalog::load(vec![a, b, c]);
        assert_eq!(catalog.entry(0).normalized_votes, 0.0);
        assert_eq!(catalog.entry(1).normalized_votes, 1.0);
        assert_eq!(catalog.entry(2).normalized_votes, 0.0);
    }

    #[test]
    fn raw_record_accepts_string_numerics() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "name": "Cafe",
            "votes": "1234",
            "aggregate_rating": "4.1"
        }))
        .unwrap();
        assert_eq!(raw.votes, Some(1234.0));
        assert_eq!(raw.aggregate_rating, Some(4.1));
    }

    #[test]
    fn raw_record_tolerates_junk_numerics() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "name": "Cafe",
            "votes": "NEW",
            "aggregate_rating": "-"
        }))
        .unwrap();
        assert_eq!(raw.votes, None);
        assert_eq!(raw.aggregate_rating, None);
    }

    #[test]
    fn raw_record_accepts_dataset_column_aliases() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "name": "Cafe",
            "Menu": "{'Burger': ['Veg', 250]}",
            "Food Sentiments": "{'burger': {'positive': 1, 'negative': 1}}"
        }))
        .unwrap();
        assert!(raw.menu.is_some());
        assert!(raw.food_sentiments.is_some());
    }
}
