use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use crate::constants::{FALLBACK_CATEGORY, PRICE_ORIGIN_SCRAPE};
use crate::db::{self, Database, DealSource, NewDeal, Region, UpsertOutcome};
use crate::error::PersistenceError;
use crate::parser::ParsedDeal;

/// What happened to one parsed deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created { id: i64, price_recorded: bool },
    Refreshed { id: i64, price_recorded: bool },
    /// Neither the detected category nor the fallback exists.
    Skipped,
}

impl SaveOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    #[must_use]
    pub fn deal_id(&self) -> Option<i64> {
        match self {
            Self::Created { id, .. } | Self::Refreshed { id, .. } => Some(*id),
            Self::Skipped => None,
        }
    }
}

/// Storage operations the pipeline needs, on top of [`Database`].
#[derive(Debug, Clone)]
pub struct DealStore {
    db: Database,
}

impl DealStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Category id for a slug, falling back to the catch-all category.
    async fn resolve_category(&self, slug: &str) -> Result<Option<i64>, PersistenceError> {
        let pool = self.db.pool();
        if let Some(category) = db::get_category_by_slug(pool, slug).await? {
            return Ok(Some(category.id));
        }
        let fallback = db::get_category_by_slug(pool, FALLBACK_CATEGORY)
            .await?;
        Ok(fallback.map(|c| c.id))
    }

    /// Create the deal for a post, or refresh title, description and score
    /// if it already exists. Prices are only written on creation.
    ///
    /// Returns `None` when no category row can be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    pub async fn upsert(
        &self,
        deal: &ParsedDeal,
        region: Region,
    ) -> Result<Option<UpsertOutcome>, PersistenceError> {
        let Some(category_id) = self.resolve_category(&deal.category_slug).await? else {
            warn!(
                category = %deal.category_slug,
                post_id = %deal.external_post_id,
                "Category not found, skipping deal"
            );
            return Ok(None);
        };

        let new_deal = NewDeal {
            source: DealSource::Reddit,
            region,
            external_post_id: deal.external_post_id.clone(),
            title: deal.title.clone(),
            description: deal.description.clone(),
            original_price: deal.original_price,
            deal_price: deal.deal_price,
            currency: deal.currency.clone(),
            discount_percent: deal.discount_percent,
            product_url: deal.product_url.clone(),
            image_url: deal.image_url.clone(),
            store: deal.store.clone(),
            category_id,
            external_score: deal.external_score,
        };

        db::upsert_deal(self.db.pool(), &new_deal)
            .await
            .map(Some)
            .map_err(PersistenceError::from)
    }

    /// Append a price sample unless it equals the latest one for the deal.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    pub async fn record_price_if_changed(
        &self,
        deal_id: i64,
        price: Decimal,
        origin: &str,
    ) -> Result<bool, PersistenceError> {
        db::insert_price_if_changed(self.db.pool(), deal_id, price, origin)
            .await
            .map_err(PersistenceError::from)
    }

    /// Upsert a parsed deal and track its price.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if either write fails.
    pub async fn save(
        &self,
        deal: &ParsedDeal,
        region: Region,
    ) -> Result<SaveOutcome, PersistenceError> {
        let Some(outcome) = self.upsert(deal, region).await? else {
            return Ok(SaveOutcome::Skipped);
        };

        let price_recorded = match deal.deal_price {
            Some(price) => {
                self.record_price_if_changed(outcome.id, price, PRICE_ORIGIN_SCRAPE)
                    .await?
            }
            None => false,
        };

        Ok(if outcome.created {
            SaveOutcome::Created {
                id: outcome.id,
                price_recorded,
            }
        } else {
            SaveOutcome::Refreshed {
                id: outcome.id,
                price_recorded,
            }
        })
    }

    /// Save a batch, isolating failures per deal. Returns how many were saved.
    pub async fn save_all(&self, deals: &[ParsedDeal], region: Region) -> usize {
        let mut saved = 0;
        for deal in deals {
            match self.save(deal, region).await {
                Ok(outcome) if outcome.is_saved() => saved += 1,
                Ok(_) => {}
                Err(PersistenceError::Conflict(msg)) => {
                    debug!(post_id = %deal.external_post_id, "Concurrent insert of same deal: {msg}");
                }
                Err(e) => {
                    error!(
                        post_id = %deal.external_post_id,
                        title = %deal.title,
                        "Failed to save deal: {e:#}"
                    );
                }
            }
        }
        saved
    }

    /// Cursor for a source, if one has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the read fails.
    pub async fn cursor(&self, source: &str) -> Result<Option<String>, PersistenceError> {
        db::get_cursor(self.db.pool(), source).await.map_err(PersistenceError::from)
    }

    /// Move a source's cursor to the given post fullname.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    pub async fn advance_cursor(&self, source: &str, cursor: &str) -> Result<(), PersistenceError> {
        db::set_cursor(self.db.pool(), source, cursor).await.map_err(PersistenceError::from)
    }
}
