use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use validator::Validate;

use crate::collateral::model::{CollateralRecord, CollateralStatus, RegisterCollateralRequest};
use crate::error::{LendingError, LendingResult, StoreError};
use crate::services::identifier::{IdentifierKind, IdentifierMinter};
use crate::services::valuation::{validate_ratio, ValuationPolicy};
use crate::store::{CollateralFilter, CollateralStore};

/// Share of the appraised value covered by warehouse insurance
const INSURANCE_RATE: Decimal = dec!(0.02);

#[derive(Clone)]
pub struct CollateralService {
    store: Arc<dyn CollateralStore>,
    valuation: ValuationPolicy,
    max_mint_attempts: u32,
}

impl CollateralService {
    pub fn new(store: Arc<dyn CollateralStore>, valuation: ValuationPolicy, max_mint_attempts: u32) -> Self {
        Self {
            store,
            valuation,
            max_mint_attempts,
        }
    }

    /// Issues a warehouse receipt for a deposit recorded by `custodian_id`
    pub async fn register(
        &self,
        custodian_id: &str,
        request: RegisterCollateralRequest,
    ) -> LendingResult<CollateralRecord> {
        request
            .validate()
            .map_err(|e| LendingError::Validation(e.to_string()))?;

        if request.quantity <= Decimal::ZERO {
            return Err(LendingError::Validation("quantity must be positive".to_string()));
        }
        if let Some(moisture) = request.moisture_content {
            if moisture < Decimal::ZERO || moisture > Decimal::ONE_HUNDRED {
                return Err(LendingError::Validation(
                    "moisture_content must be a percentage".to_string(),
                ));
            }
        }

        let loan_to_value_ratio = request
            .loan_to_value_ratio
            .unwrap_or_else(|| self.valuation.default_ratio());
        validate_ratio(loan_to_value_ratio)?;

        let insurance_value = floor_amount(Decimal::from(request.estimated_value) * INSURANCE_RATE)?;
        let storage_charges = Decimal::from(request.storage_rate)
            .checked_mul(request.quantity)
            .and_then(|v| v.checked_mul(Decimal::from(request.expected_storage_months)))
            .ok_or_else(|| LendingError::Validation("storage charges out of range".to_string()))
            .and_then(floor_amount)?;

        let now = Utc::now();
        let template = CollateralRecord {
            whr_id: String::new(),
            owner_id: request.owner_id,
            custodian_id: custodian_id.to_string(),
            warehouse_name: request.warehouse_name,
            warehouse_location: request.warehouse_location,
            crop_type: request.crop_type,
            variety: request.variety,
            quantity: request.quantity,
            quality_grade: request.quality_grade,
            moisture_content: request.moisture_content,
            estimated_value: request.estimated_value,
            price_per_unit: request.price_per_unit,
            storage_charges,
            insurance_value,
            loan_to_value_ratio,
            status: CollateralStatus::Active,
            loan_id: None,
            locked_at: None,
            issue_date: now,
            expiry_date: CollateralRecord::expiry_for(now),
            created_at: now,
            updated_at: now,
        };

        let record = IdentifierMinter::mint_with_retry(
            IdentifierKind::Collateral,
            self.max_mint_attempts,
            |whr_id| {
                let store = self.store.clone();
                let mut record = template.clone();
                record.whr_id = whr_id;
                async move {
                    store.insert_collateral(&record).await?;
                    Ok::<_, StoreError>(record)
                }
            },
        )
        .await?;

        tracing::info!(
            whr_id = %record.whr_id,
            owner_id = %record.owner_id,
            custodian_id = %record.custodian_id,
            estimated_value = record.estimated_value,
            "Warehouse receipt issued"
        );

        Ok(record)
    }

    pub async fn get_collateral(&self, whr_id: &str) -> LendingResult<CollateralRecord> {
        self.store
            .find_collateral(whr_id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("collateral {}", whr_id)))
    }

    /// Receipts deposited by `owner_id`, newest first
    pub async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<CollateralStatus>,
    ) -> LendingResult<Vec<CollateralRecord>> {
        let filter = CollateralFilter::owned_by(owner_id).with_status(status);
        Ok(self.store.list_collateral(&filter).await?)
    }

    /// Receipts issued by `custodian_id`, newest first
    pub async fn list_issued_by(
        &self,
        custodian_id: &str,
        status: Option<CollateralStatus>,
    ) -> LendingResult<Vec<CollateralRecord>> {
        let filter = CollateralFilter::issued_by(custodian_id).with_status(status);
        Ok(self.store.list_collateral(&filter).await?)
    }

    /// Amount that may be lent against the receipt
    pub async fn eligible_amount(&self, whr_id: &str) -> LendingResult<i64> {
        let collateral = self.get_collateral(whr_id).await?;
        self.valuation
            .eligible_amount(&collateral)
            .map_err(|e| e.context(format!("collateral {}", whr_id)))
    }
}

fn floor_amount(value: Decimal) -> LendingResult<i64> {
    value
        .floor()
        .to_i64()
        .ok_or_else(|| LendingError::Validation(format!("amount {} out of range", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collateral::{CropType, QualityGrade};
    use crate::store::MemoryStore;

    fn request() -> RegisterCollateralRequest {
        RegisterCollateralRequest {
            owner_id: "FRM001".into(),
            warehouse_name: "Central Grain Depot".into(),
            warehouse_location: "Indore".into(),
            crop_type: CropType::Wheat,
            variety: "Sharbati".into(),
            quantity: dec!(40),
            quality_grade: QualityGrade::A,
            moisture_content: Some(dec!(12)),
            estimated_value: 100_000,
            price_per_unit: 2_500,
            storage_rate: 15,
            expected_storage_months: 6,
            loan_to_value_ratio: None,
        }
    }

    fn service() -> CollateralService {
        CollateralService::new(Arc::new(MemoryStore::new()), ValuationPolicy::default(), 5)
    }

    #[tokio::test]
    async fn test_register_derives_charges_and_expiry() {
        let service = service();
        let record = service.register("MGR001", request()).await.unwrap();

        assert!(record.whr_id.starts_with("WHR"));
        assert_eq!(record.status, CollateralStatus::Active);
        assert_eq!(record.insurance_value, 2_000);
        assert_eq!(record.storage_charges, 15 * 40 * 6);
        assert_eq!(record.loan_to_value_ratio, dec!(0.70));
        assert_eq!(record.expiry_date, CollateralRecord::expiry_for(record.issue_date));
        assert_eq!(record.custodian_id, "MGR001");

        let fetched = service.get_collateral(&record.whr_id).await.unwrap();
        assert_eq!(fetched, record);
        assert_eq!(service.eligible_amount(&record.whr_id).await.unwrap(), 70_000);
    }

    #[tokio::test]
    async fn test_register_honours_ratio_override() {
        let mut req = request();
        req.loan_to_value_ratio = Some(dec!(0.5));
        let record = service().register("MGR001", req).await.unwrap();
        assert_eq!(record.loan_to_value_ratio, dec!(0.5));

        let mut req = request();
        req.loan_to_value_ratio = Some(dec!(1.2));
        assert!(matches!(
            service().register("MGR001", req).await,
            Err(LendingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_quantity_and_value() {
        let mut req = request();
        req.quantity = dec!(0);
        assert!(matches!(
            service().register("MGR001", req).await,
            Err(LendingError::Validation(_))
        ));

        let mut req = request();
        req.estimated_value = 0;
        assert!(matches!(
            service().register("MGR001", req).await,
            Err(LendingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_by_owner_and_custodian() {
        let store = Arc::new(MemoryStore::new());
        let service = CollateralService::new(store.clone(), ValuationPolicy::default(), 5);

        let first = service.register("MGR001", request()).await.unwrap();
        let mut other = request();
        other.owner_id = "FRM002".into();
        service.register("MGR001", other).await.unwrap();
        let second = service.register("MGR002", request()).await.unwrap();
        store
            .lock_collateral(&second.whr_id, "LN2410AAAAAA", Utc::now())
            .await
            .unwrap();

        let owned = service.list_for_owner("FRM001", None).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|r| r.owner_id == "FRM001"));
        assert!(owned.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let active = service
            .list_for_owner("FRM001", Some(CollateralStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].whr_id, first.whr_id);

        let issued = service.list_issued_by("MGR001", None).await.unwrap();
        assert_eq!(issued.len(), 2);
        assert!(issued.iter().all(|r| r.custodian_id == "MGR001"));
        assert!(service.list_for_owner("FRM404", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_receipt_is_not_found() {
        assert!(matches!(
            service().eligible_amount("WHR2401ZZZZZZ").await,
            Err(LendingError::NotFound(_))
        ));
    }
}
