//! Promo code validation, discount computation and usage accounting.
//!
//! `validate` is read-only. Usage is only counted through `redeem`, which is
//! an atomic `current_uses < max_uses` increment in the store, and handed back
//! with `release` when a booking is cancelled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retry::{with_backoff, RetryPolicy};
use super::{load_event, DomainError};
use crate::auth::AuthContext;
use crate::models::{DiscountType, PromoCode};
use crate::store::{Store, StoreError};
use crate::utils::error::{AppError, AppResult};

/// A code as supplied by an organizer, for a new or existing event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPromoCode {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub promo: PromoCodeInput,
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoQuote {
    pub promo_code_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Discount for `subtotal`, never more than the subtotal itself.
pub fn compute_discount(subtotal: Decimal, discount_type: DiscountType, value: Decimal) -> Decimal {
    if subtotal <= Decimal::ZERO || value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = match discount_type {
        DiscountType::Percentage => (subtotal * value / Decimal::ONE_HUNDRED).round_dp(2),
        DiscountType::Fixed => value,
    };
    raw.min(subtotal)
}

/// Checks the shape of a code before anything is written.
pub fn check_new_code(input: &PromoCodeInput) -> AppResult<String> {
    let code = normalize_code(&input.code);
    if code.is_empty() {
        return Err(AppError::ValidationError("code must not be empty".into()));
    }
    let in_range = match input.discount_type {
        DiscountType::Percentage => {
            input.discount_value > Decimal::ZERO && input.discount_value <= Decimal::ONE_HUNDRED
        }
        DiscountType::Fixed => input.discount_value > Decimal::ZERO,
    };
    if !in_range {
        return Err(DomainError::InvalidDiscountRange.into());
    }
    if input.max_uses.is_some_and(|max| max < 1) {
        return Err(AppError::ValidationError(
            "maxUses must be at least 1 when set".into(),
        ));
    }
    Ok(code)
}

#[derive(Clone)]
pub struct PromoValidator {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl PromoValidator {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn create(&self, ctx: &AuthContext, input: NewPromoCode) -> AppResult<PromoCode> {
        let event = load_event(self.store.as_ref(), input.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;
        self.insert_for_event(event.id, &input.promo).await
    }

    /// Inserts a code for an event whose ownership was already checked.
    pub(crate) async fn insert_for_event(
        &self,
        event_id: Uuid,
        input: &PromoCodeInput,
    ) -> AppResult<PromoCode> {
        let code = check_new_code(input)?;
        let promo = PromoCode {
            id: Uuid::new_v4(),
            event_id,
            code: code.clone(),
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            max_uses: input.max_uses,
            current_uses: 0,
            expiry_date: input.expiry_date,
            created_at: Utc::now(),
        };

        match self.store.insert_promo_code(&promo).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(DomainError::DuplicateCode(code).into()),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(promo_code_id = %promo.id, event_id = %event_id, code = %promo.code, "Promo code created");
        Ok(promo)
    }

    /// Checks that `code` may be applied to the event. Never changes usage.
    pub async fn validate(
        &self,
        event_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<PromoQuote> {
        let code = normalize_code(code);
        let promo = self
            .store
            .find_promo_code(event_id, &code)
            .await?
            .ok_or_else(|| DomainError::PromoNotFound(code.clone()))?;

        if promo.is_expired(now) {
            return Err(DomainError::PromoExpired(promo.code).into());
        }
        if promo.is_exhausted() {
            return Err(DomainError::MaxUsesReached(promo.code).into());
        }

        Ok(PromoQuote {
            promo_code_id: promo.id,
            code: promo.code,
            discount_type: promo.discount_type,
            discount_value: promo.discount_value,
        })
    }

    /// Counts one use. Fails if the code ran out or expired since validation.
    pub async fn redeem(&self, promo_code_id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        let store = self.store.as_ref();
        let redeemed = with_backoff(&self.retry, "promo.redeem", move || {
            store.try_increment_promo_usage(promo_code_id, now)
        })
        .await?;

        if redeemed {
            tracing::info!(promo_code_id = %promo_code_id, "Promo code redeemed");
            return Ok(());
        }

        match self.store.find_promo_code_by_id(promo_code_id).await? {
            Some(promo) if promo.is_expired(now) => Err(DomainError::PromoExpired(promo.code).into()),
            Some(promo) => Err(DomainError::MaxUsesReached(promo.code).into()),
            None => Err(DomainError::PromoNotFound(promo_code_id.to_string()).into()),
        }
    }

    /// Hands back one use of a cancelled booking.
    pub async fn release(&self, promo_code_id: Uuid) -> AppResult<()> {
        let store = self.store.as_ref();
        with_backoff(&self.retry, "promo.release", move || {
            store.release_promo_usage(promo_code_id)
        })
        .await?;
        tracing::info!(promo_code_id = %promo_code_id, "Promo code usage released");
        Ok(())
    }

    pub async fn list(&self, ctx: &AuthContext, event_id: Uuid) -> AppResult<Vec<PromoCode>> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;
        Ok(self.store.list_promo_codes(event_id).await?)
    }

    pub async fn delete(&self, ctx: &AuthContext, promo_code_id: Uuid) -> AppResult<()> {
        let promo = self
            .store
            .find_promo_code_by_id(promo_code_id)
            .await?
            .ok_or_else(|| DomainError::PromoNotFound(promo_code_id.to_string()))?;
        let event = load_event(self.store.as_ref(), promo.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        if !self.store.delete_promo_code(promo_code_id).await? {
            return Err(DomainError::PromoNotFound(promo.code).into());
        }
        tracing::info!(promo_code_id = %promo_code_id, "Promo code deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{organizer, seed_event};
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn input(code: &str, discount_type: DiscountType, value: i64) -> PromoCodeInput {
        PromoCodeInput {
            code: code.to_string(),
            discount_type,
            discount_value: Decimal::from(value),
            max_uses: None,
            expiry_date: None,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, PromoValidator, AuthContext, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let promos = PromoValidator::new(store.clone(), RetryPolicy::default());
        let ctx = organizer();
        let event = seed_event(&store, ctx.user_id).await;
        (store, promos, ctx, event.id)
    }

    #[test]
    fn test_percentage_discount() {
        let discount = compute_discount(Decimal::from(50), DiscountType::Percentage, Decimal::from(10));
        assert_eq!(discount, Decimal::from(5));
        assert_eq!(Decimal::from(50) - discount, Decimal::from(45));
    }

    #[test]
    fn test_fixed_discount_is_clamped_to_subtotal() {
        let discount = compute_discount(Decimal::from(10), DiscountType::Fixed, Decimal::from(50));
        assert_eq!(discount, Decimal::from(10));
    }

    #[test]
    fn test_percentage_discount_rounds_to_cents() {
        let discount = compute_discount(
            Decimal::new(1999, 2),
            DiscountType::Percentage,
            Decimal::from(15),
        );
        assert_eq!(discount, Decimal::new(300, 2));
    }

    #[test]
    fn test_check_new_code_rejects_out_of_range_percentage() {
        assert_matches!(
            check_new_code(&input("BIG", DiscountType::Percentage, 150)),
            Err(AppError::Domain(DomainError::InvalidDiscountRange))
        );
        assert_matches!(
            check_new_code(&input("ZERO", DiscountType::Percentage, 0)),
            Err(AppError::Domain(DomainError::InvalidDiscountRange))
        );
        assert_eq!(
            check_new_code(&input(" save10 ", DiscountType::Percentage, 100)).unwrap(),
            "SAVE10"
        );
    }

    #[tokio::test]
    async fn test_create_uppercases_and_rejects_duplicates() {
        let (_store, promos, ctx, event_id) = setup().await;
        let created = promos
            .create(&ctx, NewPromoCode { event_id, promo: input("save10", DiscountType::Percentage, 10) })
            .await
            .unwrap();
        assert_eq!(created.code, "SAVE10");

        let err = promos
            .create(&ctx, NewPromoCode { event_id, promo: input("SAVE10", DiscountType::Fixed, 5) })
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::DuplicateCode(code)) if code == "SAVE10");
    }

    #[tokio::test]
    async fn test_create_requires_event_ownership() {
        let (_store, promos, _owner, event_id) = setup().await;
        let stranger = organizer();
        let err = promos
            .create(&stranger, NewPromoCode { event_id, promo: input("X", DiscountType::Fixed, 5) })
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));
    }

    #[tokio::test]
    async fn test_validate_is_case_insensitive_and_read_only() {
        let (store, promos, ctx, event_id) = setup().await;
        let mut promo = input("SAVE10", DiscountType::Percentage, 10);
        promo.max_uses = Some(1);
        let created = promos.create(&ctx, NewPromoCode { event_id, promo }).await.unwrap();

        for _ in 0..3 {
            let quote = promos.validate(event_id, "save10", Utc::now()).await.unwrap();
            assert_eq!(quote.discount_value, Decimal::from(10));
        }
        let stored = store.find_promo_code_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.current_uses, 0);
    }

    #[tokio::test]
    async fn test_validate_unknown_code() {
        let (_store, promos, _ctx, event_id) = setup().await;
        let err = promos.validate(event_id, "NOPE", Utc::now()).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::PromoNotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_expired_code() {
        let (_store, promos, ctx, event_id) = setup().await;
        let mut promo = input("LATE", DiscountType::Fixed, 5);
        promo.expiry_date = Some(Utc::now() - Duration::days(1));
        promos.create(&ctx, NewPromoCode { event_id, promo }).await.unwrap();

        let err = promos.validate(event_id, "LATE", Utc::now()).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::PromoExpired(_)));
    }

    #[tokio::test]
    async fn test_redeem_respects_max_uses() {
        let (store, promos, ctx, event_id) = setup().await;
        let mut promo = input("ONCE", DiscountType::Fixed, 5);
        promo.max_uses = Some(1);
        let created = promos.create(&ctx, NewPromoCode { event_id, promo }).await.unwrap();

        promos.redeem(created.id).await.unwrap();
        let err = promos.redeem(created.id).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::MaxUsesReached(_)));

        let err = promos.validate(event_id, "ONCE", Utc::now()).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::MaxUsesReached(_)));

        promos.release(created.id).await.unwrap();
        let stored = store.find_promo_code_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.current_uses, 0);
    }

    #[tokio::test]
    async fn test_concurrent_redeems_never_exceed_max_uses() {
        let (store, promos, ctx, event_id) = setup().await;
        let mut promo = input("RUSH", DiscountType::Fixed, 5);
        promo.max_uses = Some(3);
        let created = promos.create(&ctx, NewPromoCode { event_id, promo }).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let promos = promos.clone();
                tokio::spawn(async move { promos.redeem(created.id).await.is_ok() })
            })
            .collect();
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 3);
        let stored = store.find_promo_code_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.current_uses, 3);
    }

    #[tokio::test]
    async fn test_delete_unlinks_from_event() {
        let (store, promos, ctx, event_id) = setup().await;
        let created = promos
            .create(&ctx, NewPromoCode { event_id, promo: input("GONE", DiscountType::Fixed, 5) })
            .await
            .unwrap();
        let event = store.find_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.promo_code_ids, vec![created.id]);

        promos.delete(&ctx, created.id).await.unwrap();
        let event = store.find_event(event_id).await.unwrap().unwrap();
        assert!(event.promo_code_ids.is_empty());
    }
}
