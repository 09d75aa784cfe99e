//! The dual-signal recommendation engine.
//!
//! One `Recommender` owns the loaded catalog and two fitted TF-IDF spaces
//! (descriptive features and menu text). Every operation is synchronous,
//! takes `&self`, and is deterministic for a fixed catalog.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use log::{debug, info};
use rayon::prelude::*;

use crate::algo::fuzzy;
use crate::algo::text;
use crate::algo::tfidf::TfidfIndex;
use crate::api::{
    DishMatch, new_recommendation_id, RecommendationRequest, RecommendationResponse,
    RecommendedRestaurant,
};
use crate::catalog::{Catalog, EntryId};
use crate::error::EngineError;

/// Tunable thresholds and weights. Defaults match the production service.
#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    /// A name resolves only when its best fuzzy score strictly exceeds this.
    pub resolve_threshold: f64,
    /// A menu item matches a dish only strictly above this.
    pub dish_threshold: f64,
    /// Popularity floor; entries below never rank.
    pub min_votes: u32,
    /// Minimum resolvable restaurants per recommendation request.
    pub min_selections: usize,
    /// Candidates drawn from the feature signal before combining.
    pub feature_pool: usize,
    /// Candidates drawn from the menu signal before combining.
    pub menu_pool: usize,
    /// Final list length after combining.
    pub final_count: usize,
    pub feature_weight: f64,
    pub menu_weight: f64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            resolve_threshold: 60.0,
            dish_threshold: 70.0,
            min_votes: 50,
            min_selections: 3,
            feature_pool: 20,
            menu_pool: 10,
            final_count: 10,
            feature_weight: 0.7,
            menu_weight: 0.3,
        }
    }
}

#[derive(Debug)]
pub struct Recommender {
    catalog: Catalog,
    config: RecommenderConfig,
    feature_index: TfidfIndex,
    menu_index: TfidfIndex,
    /// Per-entry quality score, fixed at build time.
    quality: Vec<f64>,
}

impl Recommender {
    pub fn new(catalog: Catalog) -> Result<Self, EngineError> {
        Self::with_config(catalog, RecommenderConfig::default())
    }

    pub fn with_config(catalog: Catalog, config: RecommenderConfig) -> Result<Self, EngineError> {
        if catalog.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }

        let feature_docs: Vec<Vec<String>> = catalog
            .entries()
            .par_iter()
            .map(|e| text::tokenize(&e.combined_feature_text))
            .collect();
        let menu_docs: Vec<Vec<String>> = catalog
            .entries()
            .par_iter()
            .map(|e| text::tokenize(&e.menu_text))
            .collect();
        let feature_index = TfidfIndex::fit(&feature_docs);
        let menu_index = TfidfIndex::fit(&menu_docs);
        let quality = quality_scores(&catalog);

        info!(
            "engine ready: {} restaurants, {} feature docs, {} menu docs",
            catalog.len(),
            feature_index.num_docs(),
            menu_index.num_docs()
        );
        Ok(Self {
            catalog,
            config,
            feature_index,
            menu_index,
            quality,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    // ── Operations ──────────────────────────────────────────────────────────

    /// Fuzzy-resolve a free-text name to the best-matching entry, if its
    /// score strictly exceeds the threshold. Ties keep the lowest id.
    pub fn resolve(&self, query: &str) -> Option<EntryId> {
        let query = query.trim();
        let mut best: Option<(EntryId, f64)> = None;
        for entry in self.catalog.iter() {
            let score = fuzzy::ratio_ignore_case(query, &entry.cleaned_name);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry.id, score));
            }
        }
        best.filter(|&(_, score)| score > self.config.resolve_threshold)
            .map(|(id, _)| id)
    }

    /// Rank candidates by feature-text similarity to the selected entries.
    /// The selections and their branches never appear in the result.
    pub fn rank_by_restaurants(&self, ids: &[EntryId], limit: usize) -> Vec<(EntryId, f64)> {
        if ids.is_empty() {
            return Vec::new();
        }
        let sims = self.feature_index.similarities_to_rows(ids);
        self.top_candidates(&sims, ids, limit)
    }

    /// Rank candidates by menu-text similarity to the given dish names.
    /// Nothing is excluded by id; branch de-duplication still applies.
    pub fn rank_by_dishes(&self, dish_names: &[String], limit: usize) -> Vec<(EntryId, f64)> {
        let query = dish_names.join(" ").to_lowercase();
        let tokens = text::tokenize(&query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let sims = self.menu_index.similarities_to_tokens(&tokens);
        self.top_candidates(&sims, &[], limit)
    }

    /// Blend the two ranked lists into the final list. Ids appearing in both
    /// earn both weighted contributions; the rest default the missing side
    /// to zero. Ties keep first-list order, then first appearance.
    pub fn combine(
        &self,
        feature: &[(EntryId, f64)],
        menu: &[(EntryId, f64)],
    ) -> Vec<(EntryId, f64)> {
        let feature_scores: HashMap<EntryId, f64> = feature
            .iter()
            .map(|&(id, s)| (id, s * self.config.feature_weight))
            .collect();
        let menu_scores: HashMap<EntryId, f64> = menu
            .iter()
            .map(|&(id, s)| (id, s * self.config.menu_weight))
            .collect();

        let mut seen: HashSet<EntryId> = HashSet::new();
        let mut combined: Vec<(EntryId, f64)> = Vec::new();
        for &(id, _) in feature.iter().chain(menu) {
            if seen.insert(id) {
                let score = feature_scores.get(&id).copied().unwrap_or(0.0)
                    + menu_scores.get(&id).copied().unwrap_or(0.0);
                combined.push((id, score));
            }
        }
        combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        combined.truncate(self.config.final_count);
        combined
    }

    /// Fuzzy-match requested dishes against every menu item in the catalog,
    /// sorted by similarity then price, one match per restaurant and item.
    pub fn match_dishes(&self, dish_names: &[String]) -> Vec<DishMatch> {
        let mut matches: Vec<DishMatch> = Vec::new();
        for dish in dish_names {
            for entry in self.catalog.iter() {
                for item in &entry.menu {
                    let similarity = fuzzy::ratio_ignore_case(dish, &item.item);
                    if similarity > self.config.dish_threshold {
                        matches.push(DishMatch {
                            restaurant: entry.name.clone(),
                            original_dish: dish.clone(),
                            similar_dish: item.item.clone(),
                            price: item.price,
                            veg_status: item.veg_status.clone(),
                            similarity,
                            rating: entry.rating,
                            address: entry.address.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal))
        });
        let mut seen: HashSet<(String, String)> = HashSet::new();
        matches.retain(|m| seen.insert((m.restaurant.clone(), m.similar_dish.clone())));
        matches
    }

    /// Every display name, in catalog order.
    pub fn all_names(&self) -> Vec<&str> {
        self.catalog.iter().map(|e| e.name.as_str()).collect()
    }

    /// The full request flow: resolve every selection, enforce the minimum,
    /// rank both signals, combine, and match dishes.
    pub fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse, EngineError> {
        let mut resolved: Vec<EntryId> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        for selection in &request.restaurants {
            match self.resolve(&selection.name) {
                Some(id) => resolved.push(id),
                None => failed.push(selection.name.clone()),
            }
        }
        if resolved.len() < self.config.min_selections {
            return Err(EngineError::InsufficientInput {
                required: self.config.min_selections,
                resolved: resolved.len(),
                failed,
            });
        }
        if let Some(name) = failed.into_iter().next() {
            return Err(EngineError::NotFound { name });
        }

        let dish_names = request.dish_names();
        debug!(
            "recommending for {} restaurants, {} dishes",
            resolved.len(),
            dish_names.len()
        );

        let feature_recs = self.rank_by_restaurants(&resolved, self.config.feature_pool);
        let menu_recs = if dish_names.is_empty() {
            Vec::new()
        } else {
            self.rank_by_dishes(&dish_names, self.config.menu_pool)
        };
        let final_recs = self.combine(&feature_recs, &menu_recs);
        let similar_dishes = if dish_names.is_empty() {
            Vec::new()
        } else {
            self.match_dishes(&dish_names)
        };

        let recommended_restaurants = final_recs
            .iter()
            .map(|&(id, score)| RecommendedRestaurant::from_entry(self.catalog.entry(id), score))
            .collect();
        Ok(RecommendationResponse {
            recommendation_id: new_recommendation_id(),
            recommended_restaurants,
            similar_dishes,
        })
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Scan in id order, applying the popularity floor, id and branch
    /// exclusions, and first-seen branch de-duplication, then stable-sort by
    /// quality-weighted score descending and truncate.
    fn top_candidates(
        &self,
        similarity: &[f64],
        excluded: &[EntryId],
        limit: usize,
    ) -> Vec<(EntryId, f64)> {
        let excluded_ids: HashSet<EntryId> = excluded.iter().copied().collect();
        let excluded_bases: HashSet<&str> = excluded
            .iter()
            .map(|&id| self.catalog.entry(id).base_name.as_str())
            .collect();

        let mut seen_bases: HashSet<&str> = HashSet::new();
        let mut scored: Vec<(EntryId, f64)> = Vec::new();
        for entry in self.catalog.iter() {
            if !entry.votes.is_some_and(|v| v >= self.config.min_votes)
                || excluded_ids.contains(&entry.id)
                || excluded_bases.contains(entry.base_name.as_str())
                || seen_bases.contains(entry.base_name.as_str())
            {
                continue;
            }
            scored.push((entry.id, similarity[entry.id] * self.quality[entry.id]));
            seen_bases.insert(entry.base_name.as_str());
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// 0.4 × positive ratio + 0.3 × normalized votes + 0.3 × review volume,
/// with the volume term saturating at 100 reviews.
fn quality_scores(catalog: &Catalog) -> Vec<f64> {
    catalog
        .iter()
        .map(|e| {
            0.4 * e.sentiment.positive_ratio
                + 0.3 * e.normalized_votes
                + 0.3 * (f64::from(e.sentiment.total_reviews) / 100.0).min(1.0)
        })
        .collect()
}
