//! Batch submission to the topology store

use crate::crypto::Digest;
use crate::effects::{BatchRejection, RejectionReason, TopologyWriteEffects, WriteFailure};
use crate::errors::{ErrorContext, Result, TopologyError};
use crate::transaction::TransactionBatch;
use crate::types::StoreId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Record of an accepted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Store the batch was applied to
    pub store: StoreId,
    /// Hashes of the applied transactions, in batch order
    pub transaction_hashes: Vec<Digest>,
    /// Combined hash over the batch
    pub combined_hash: Digest,
}

/// Submits signed batches and classifies store rejections
pub struct BatchSubmitter<'a, W: ?Sized> {
    writer: &'a W,
}

impl<'a, W> BatchSubmitter<'a, W>
where
    W: TopologyWriteEffects + ?Sized,
{
    /// Create a submitter over `writer`
    pub fn new(writer: &'a W) -> Self {
        Self { writer }
    }

    /// Submit `batch`.
    ///
    /// The store applies the whole batch or nothing. A rejection names the
    /// first failing transaction; its index, hash, unique key and serial are
    /// carried in the error context.
    pub async fn submit(&self, batch: &TransactionBatch) -> Result<SubmissionReceipt> {
        let combined_hash = batch.combined_hash();
        info!(
            store = %batch.store(),
            transactions = batch.len(),
            combined_hash = %combined_hash,
            "Submitting topology batch"
        );

        match self.writer.add_transactions(batch).await {
            Ok(()) => {
                info!(
                    store = %batch.store(),
                    combined_hash = %combined_hash,
                    "Topology batch accepted"
                );
                Ok(SubmissionReceipt {
                    store: batch.store().clone(),
                    transaction_hashes: batch.hashes(),
                    combined_hash,
                })
            }
            Err(WriteFailure::Rejected(rejection)) => Err(classify_rejection(batch, rejection)),
            Err(WriteFailure::Transport {
                message,
                indeterminate,
            }) => {
                warn!(
                    store = %batch.store(),
                    indeterminate,
                    error = %message,
                    "Topology batch submission failed in transit"
                );
                Err(TopologyError::transport(message, indeterminate))
            }
        }
    }
}

fn classify_rejection(batch: &TransactionBatch, rejection: BatchRejection) -> TopologyError {
    let mut context = ErrorContext::new();
    if let Some(tx) = batch.transactions().get(rejection.index) {
        context = ErrorContext::for_key(&tx.transaction().unique_key())
            .with_serial(tx.transaction().serial());
    }
    let context = context.with_transaction(rejection.index, rejection.transaction_hash);

    let message = rejection.reason.to_string();
    let error = match rejection.reason {
        RejectionReason::StaleSerial { expected, .. } => {
            warn!(
                index = rejection.index,
                hash = %rejection.transaction_hash,
                expected_serial = expected.value(),
                "Topology store rejected a stale serial"
            );
            TopologyError::concurrency_conflict(message, Some(expected))
        }
        RejectionReason::BadSignature | RejectionReason::AuthorizationDenied(_) => {
            warn!(
                index = rejection.index,
                hash = %rejection.transaction_hash,
                reason = %message,
                "Topology store rejected batch authorization"
            );
            TopologyError::authorization_rejected(message)
        }
        RejectionReason::Malformed(_) => TopologyError::encoding(message),
    };
    error.with_context(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{SigningAlgorithmSpec, SigningKeyUsage, SigningPublicKey};
    use crate::mapping::build_namespace_delegation;
    use crate::transaction::{Signature, SignatureFormat, TopologyTransaction};
    use crate::types::Serial;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    struct FixedOutcome(std::result::Result<(), WriteFailure>);

    #[async_trait]
    impl TopologyWriteEffects for FixedOutcome {
        async fn add_transactions(
            &self,
            _batch: &TransactionBatch,
        ) -> std::result::Result<(), WriteFailure> {
            self.0.clone()
        }
    }

    fn batch() -> TransactionBatch {
        let key = SigningPublicKey::ed25519([6u8; 32], [SigningKeyUsage::Namespace]);
        let mapping = build_namespace_delegation(key.fingerprint(), key.clone(), true).unwrap();
        let signed = TopologyTransaction::add_replace(Serial::FIRST, mapping)
            .prepare()
            .unwrap()
            .into_signed(
                vec![Signature {
                    format: SignatureFormat::Raw,
                    signature: vec![1u8; 64],
                    signed_by: key.fingerprint(),
                    algorithm: SigningAlgorithmSpec::Ed25519,
                }],
                true,
            )
            .unwrap();
        TransactionBatch::new(StoreId::Authorized, vec![signed]).unwrap()
    }

    fn rejected(batch: &TransactionBatch, reason: RejectionReason) -> FixedOutcome {
        FixedOutcome(Err(WriteFailure::Rejected(BatchRejection {
            index: 0,
            transaction_hash: batch.hashes()[0],
            reason,
        })))
    }

    #[tokio::test]
    async fn test_accepted_batch_receipt() {
        let batch = batch();
        let writer = FixedOutcome(Ok(()));
        let receipt = BatchSubmitter::new(&writer).submit(&batch).await.unwrap();
        assert_eq!(receipt.transaction_hashes, batch.hashes());
        assert_eq!(receipt.combined_hash, batch.combined_hash());
    }

    #[tokio::test]
    async fn test_stale_serial_is_conflict_with_context() {
        let batch = batch();
        let writer = rejected(
            &batch,
            RejectionReason::StaleSerial {
                expected: Serial::new(2).unwrap(),
                attempted: Serial::FIRST,
            },
        );
        let err = BatchSubmitter::new(&writer).submit(&batch).await.unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(
            err,
            TopologyError::ConcurrencyConflict { expected_serial: Some(s), context, .. }
                if s.value() == 2
                    && context.transaction_index == Some(0)
                    && context.transaction_hash == Some(batch.hashes()[0])
                    && context.attempted_serial == Some(Serial::FIRST)
        );
    }

    #[tokio::test]
    async fn test_rejections_are_classified() {
        let batch = batch();
        let submitter_err = |reason| {
            let batch = batch.clone();
            async move {
                let writer = rejected(&batch, reason);
                BatchSubmitter::new(&writer).submit(&batch).await.unwrap_err()
            }
        };

        assert_matches!(
            submitter_err(RejectionReason::BadSignature).await,
            TopologyError::AuthorizationRejected { .. }
        );
        assert_matches!(
            submitter_err(RejectionReason::AuthorizationDenied("no delegation".into())).await,
            TopologyError::AuthorizationRejected { .. }
        );
        assert_matches!(
            submitter_err(RejectionReason::Malformed("truncated".into())).await,
            TopologyError::Encoding { .. }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_indeterminate_flag() {
        let batch = batch();
        let writer = FixedOutcome(Err(WriteFailure::Transport {
            message: "deadline exceeded".into(),
            indeterminate: true,
        }));
        let err = BatchSubmitter::new(&writer).submit(&batch).await.unwrap_err();
        assert!(err.outcome_unknown());
        assert!(!err.is_retryable());
    }
}
