//! Request and response types of the recommendation surface.
//!
//! These mirror the wire contract callers see: selections in, a ranked
//! restaurant list plus dish matches out, keyed by a timestamp-derived
//! recommendation id. Non-finite floats serialize as `null`.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;

/// A restaurant the caller already likes, referenced by free-text name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantRef {
    pub name: String,
}

/// A favorite dish, referenced by free-text name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub restaurants: Vec<RestaurantRef>,
    #[serde(default)]
    pub favorite_dishes: Option<Vec<DishRef>>,
}

impl RecommendationRequest {
    /// Dish names in request order; an absent list reads as empty.
    pub fn dish_names(&self) -> Vec<String> {
        self.favorite_dishes
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }
}

/// One ranked restaurant in a recommendation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedRestaurant {
    pub name: String,
    pub address: Option<String>,
    pub cuisines: Option<String>,
    pub votes: u32,
    pub avg_price: f64,
    pub positive_ratio: f64,
    pub total_reviews: u32,
    pub highlights: Option<String>,
    pub similarity_score: f64,
}

impl RecommendedRestaurant {
    pub fn from_entry(entry: &CatalogEntry, similarity_score: f64) -> Self {
        Self {
            name: entry.name.clone(),
            address: entry.address.clone(),
            cuisines: entry.cuisines.clone(),
            votes: entry.votes.unwrap_or(0),
            avg_price: entry.avg_price,
            positive_ratio: entry.sentiment.positive_ratio,
            total_reviews: entry.sentiment.total_reviews,
            highlights: entry.highlights.clone(),
            similarity_score,
        }
    }
}

/// One menu item matched against a requested dish. `similar_dish` keeps the
/// menu's original casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishMatch {
    pub restaurant: String,
    pub original_dish: String,
    pub similar_dish: String,
    pub price: f64,
    pub veg_status: String,
    pub similarity: f64,
    pub rating: Option<f64>,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendation_id: String,
    pub recommended_restaurants: Vec<RecommendedRestaurant>,
    pub similar_dishes: Vec<DishMatch>,
}

/// Timestamp-derived id in `%Y%m%d_%H%M%S` form, as the original service
/// issued them.
pub fn new_recommendation_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
