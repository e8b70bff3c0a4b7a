//! # Ledger
//!
//! The ledger is the only channel between participants. It owns the
//! [`Arbiter`], orders transactions, and returns a [`Receipt`] carrying the
//! arbiter's events once a transaction is included in a block.
use crate::{
    primitives::{
        AccountHandle, Amount, Arbiter, BlockNumber, ComplaintOutcome, ComplaintRecord,
        ConfigError, DKGError, EncryptedShare, ErrorKind, Event, Gas, Malformation, Operation,
        ParticipantId, Phase, PolynomialCommitment, ProtocolConfig, Reason, Settlement,
    },
    vss::VssProvider,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use threshold_vss::encoding::{decode_flat, Encode, EncodingError, FixedSize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The arbiter rejected the transaction
    #[error(transparent)]
    Rejected(#[from] DKGError),
    /// The ledger could not be reached, the call may be retried
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("{account} holds {balance}, {required} required")]
    InsufficientFunds {
        account: AccountHandle,
        required: Amount,
        balance: Amount,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Rejected(err) => err.kind(),
            LedgerError::Unavailable(_) => ErrorKind::Resource,
            LedgerError::InsufficientFunds { .. } => ErrorKind::Validation,
        }
    }

    /// True if the same call may succeed when retried as is
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }

    /// The arbiter's reason, if the transaction was rejected
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            LedgerError::Rejected(err) => Some(&err.reason),
            _ => None,
        }
    }
}

/// Proof that a transaction was included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub block: BlockNumber,
    pub gas_used: Gas,
    /// The events emitted by the transaction, in order
    pub events: Vec<Event>,
}

impl Receipt {
    /// The id assigned to `account`, if it joined in this transaction
    pub fn joined(&self, account: &AccountHandle) -> Option<ParticipantId> {
        self.events.iter().find_map(|e| match e {
            Event::ParticipantJoined { id, account: a } if a == account => Some(*id),
            _ => None,
        })
    }

    pub fn committed(&self, id: ParticipantId) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, Event::NewCommit { id: i } if *i == id))
    }

    pub fn complaint_outcome(&self) -> Option<ComplaintOutcome> {
        self.events.iter().find_map(|e| match e {
            Event::ComplaintResolved { outcome, .. } => Some(*outcome),
            _ => None,
        })
    }

    /// True if the transaction moved the instance to `phase`
    pub fn entered(&self, phase: Phase) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, Event::PhaseChange { to, .. } if *to == phase))
    }
}

/// The calls a participant can make to the ledger. Points, scalars and
/// ciphertexts are passed in their fixed width big-endian encoding, points
/// of a commitment concatenated.
///
/// Writes only return once the transaction was included.
#[async_trait(?Send)]
pub trait Ledger<V: VssProvider> {
    /// Enrolls `account`, locking `deposit`. Confirmed by `ParticipantJoined`.
    async fn join(
        &self,
        account: &AccountHandle,
        deposit: Amount,
        public_key: &[u8],
    ) -> Result<Receipt, LedgerError>;

    /// Publishes `id`'s commitment and its shares, ordered by recipient id.
    /// Confirmed by `NewCommit`.
    async fn commit(
        &self,
        account: &AccountHandle,
        id: ParticipantId,
        g1: &[u8],
        g2: &[u8],
        shares: &[Vec<u8>],
    ) -> Result<Receipt, LedgerError>;

    /// Reveals `complainer`'s secret key to prove that `accused`'s share is
    /// inconsistent. Confirmed by `ComplaintResolved`.
    async fn complaint_private_commit(
        &self,
        account: &AccountHandle,
        complainer: ParticipantId,
        accused: ParticipantId,
        secret_key: &[u8],
    ) -> Result<Receipt, LedgerError>;

    /// Finalizes the instance once the challenge window has passed
    async fn phase_change(&self, account: &AccountHandle) -> Result<Receipt, LedgerError>;

    /// Ends a stalled instance
    async fn expire(&self, account: &AccountHandle) -> Result<Receipt, LedgerError>;

    /// Mines `blocks` empty blocks, returns the new height. Development
    /// ledgers only.
    async fn mine(&self, blocks: BlockNumber) -> Result<BlockNumber, LedgerError>;

    async fn block_number(&self) -> Result<BlockNumber, LedgerError>;

    async fn current_phase(&self) -> Result<Phase, LedgerError>;

    async fn threshold(&self) -> Result<usize, LedgerError>;

    async fn participant_count(&self) -> Result<usize, LedgerError>;

    /// The ids and share encryption keys of everybody enrolled
    async fn participants(&self) -> Result<Vec<(ParticipantId, V::G1)>, LedgerError>;

    async fn commitment(
        &self,
        id: ParticipantId,
    ) -> Result<Option<PolynomialCommitment<V>>, LedgerError>;

    async fn share(
        &self,
        from: ParticipantId,
        to: ParticipantId,
    ) -> Result<Option<EncryptedShare<V>>, LedgerError>;

    async fn complaint(&self) -> Result<Option<ComplaintRecord>, LedgerError>;

    async fn group_public_key(&self) -> Result<Option<V::G2>, LedgerError>;

    async fn member_public_key(&self, id: ParticipantId) -> Result<Option<V::G2>, LedgerError>;

    async fn settlement(&self) -> Result<Option<Settlement>, LedgerError>;

    /// The funds held by `account`
    async fn balance(&self, account: &AccountHandle) -> Result<Amount, LedgerError>;

    /// The deposits held in escrow
    async fn held(&self) -> Result<Amount, LedgerError>;
}

/// Observational gas costs, loosely modelled on the EVM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    pub transaction: Gas,
    pub calldata_zero_byte: Gas,
    pub calldata_byte: Gas,
    /// Per 32 byte word written to storage
    pub storage_word: Gas,
    /// Per commitment coefficient evaluated while resolving a complaint
    pub complaint_coefficient: Gas,
    /// Per deposit paid out
    pub transfer: Gas,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            transaction: 21_000,
            calldata_zero_byte: 4,
            calldata_byte: 16,
            storage_word: 20_000,
            complaint_coefficient: 12_300,
            transfer: 9_000,
        }
    }
}

impl GasSchedule {
    fn calldata(&self, bytes: &[u8]) -> Gas {
        bytes
            .iter()
            .map(|b| {
                if *b == 0 {
                    self.calldata_zero_byte
                } else {
                    self.calldata_byte
                }
            })
            .sum()
    }

    /// Cost of a transaction before it is executed
    fn intrinsic(&self, calldata: &[&[u8]], stored_bytes: usize) -> Gas {
        let words = ((stored_bytes + 31) / 32) as Gas;
        self.transaction
            + calldata.iter().map(|c| self.calldata(c)).sum::<Gas>()
            + words * self.storage_word
    }
}

struct State<V: VssProvider> {
    arbiter: Arbiter<V>,
    block: BlockNumber,
    wallets: HashMap<AccountHandle, Amount>,
    /// Number of upcoming transactions which fail as if the ledger was down
    outages: usize,
    gas: GasSchedule,
}

impl<V: VssProvider> State<V> {
    fn balance(&self, account: &AccountHandle) -> Amount {
        self.wallets.get(account).copied().unwrap_or_default()
    }

    /// Executes `f` in the next block. A rejected transaction is not
    /// included and changes nothing.
    fn transact<F>(
        &mut self,
        sender: &AccountHandle,
        gas: Gas,
        f: F,
    ) -> Result<Receipt, LedgerError>
    where
        F: FnOnce(&mut Self, BlockNumber) -> Result<(), LedgerError>,
    {
        if self.outages > 0 {
            self.outages -= 1;
            warn!(account = %sender, remaining = self.outages, "ledger unavailable");
            return Err(LedgerError::Unavailable(
                "transaction could not be submitted".to_owned(),
            ));
        }

        let now = self.block + 1;
        let before = self.arbiter.events().len();
        f(self, now)?;
        self.block = now;

        let events = self.arbiter.events()[before..].to_vec();
        let mut gas_used = gas;
        for event in &events {
            if let Event::DepositReleased { id, amount } = event {
                gas_used += self.gas.transfer;
                if let Some(p) = self.arbiter.participant(*id) {
                    let wallet = self.wallets.entry(p.account.clone()).or_default();
                    *wallet = wallet.saturating_add(*amount);
                }
            }
        }

        if let Some(id) = self.arbiter.participant_by_account(sender).map(|p| p.id) {
            self.arbiter.charge_gas(id, gas_used);
        }

        debug!(block = now, gas_used, events = events.len(), "transaction included");
        Ok(Receipt {
            block: now,
            gas_used,
            events,
        })
    }
}

/// A development ledger which keeps everything in memory. Each included
/// transaction mines one block. Cloning it gives another handle to the same
/// ledger.
pub struct InMemoryLedger<V: VssProvider> {
    state: Arc<Mutex<State<V>>>,
}

impl<V: VssProvider> Clone for InMemoryLedger<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<V: VssProvider> InMemoryLedger<V> {
    /// Deploys a new instance at block 0
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        Self::with_gas_schedule(config, GasSchedule::default())
    }

    pub fn with_gas_schedule(config: ProtocolConfig, gas: GasSchedule) -> Result<Self, ConfigError> {
        let state = State {
            arbiter: Arbiter::new(config, 0)?,
            block: 0,
            wallets: HashMap::new(),
            outages: 0,
            gas,
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Credits `amount` to `account`
    pub async fn fund(&self, account: &AccountHandle, amount: Amount) {
        let mut state = self.state.lock().await;
        *state.wallets.entry(account.clone()).or_default() += amount;
    }

    /// Makes the next `transactions` writes fail with `Unavailable`
    pub async fn inject_outage(&self, transactions: usize) {
        self.state.lock().await.outages = transactions;
    }

    /// Every event emitted so far
    pub async fn events(&self) -> Vec<Event> {
        self.state.lock().await.arbiter.events().to_vec()
    }

    /// Gas spent by every participant, by id
    pub async fn gas_spent(&self) -> Vec<(ParticipantId, Gas)> {
        let state = self.state.lock().await;
        state
            .arbiter
            .participants()
            .map(|p| (p.id, p.gas_spent))
            .collect()
    }
}

fn rejected(operation: Operation, phase: Phase, reason: Reason) -> LedgerError {
    LedgerError::Rejected(DKGError::new(operation, phase, reason))
}

#[async_trait(?Send)]
impl<V: VssProvider> Ledger<V> for InMemoryLedger<V> {
    async fn join(
        &self,
        account: &AccountHandle,
        deposit: Amount,
        public_key: &[u8],
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        // the key and the deposit
        let gas = state
            .gas
            .intrinsic(&[public_key], <V::G1 as FixedSize>::SIZE + 32);

        state.transact(account, gas, |s, now| {
            let balance = s.balance(account);
            if balance < deposit {
                return Err(LedgerError::InsufficientFunds {
                    account: account.clone(),
                    required: deposit,
                    balance,
                });
            }

            let key = V::G1::decode(public_key).map_err(|e| {
                rejected(Operation::Enroll, s.arbiter.phase(), Reason::MalformedKey(e))
            })?;
            s.arbiter.enroll(account.clone(), deposit, key, now)?;
            s.wallets.insert(account.clone(), balance - deposit);
            Ok(())
        })
    }

    async fn commit(
        &self,
        account: &AccountHandle,
        id: ParticipantId,
        g1: &[u8],
        g2: &[u8],
        shares: &[Vec<u8>],
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        let mut calldata = vec![g1, g2];
        calldata.extend(shares.iter().map(|s| s.as_slice()));
        let stored: usize = calldata.iter().map(|c| c.len()).sum();
        let gas = state.gas.intrinsic(&calldata, stored);

        state.transact(account, gas, |s, now| {
            let decoded = decode_flat::<V::G1>(g1).and_then(|g1| {
                let g2 = decode_flat::<V::G2>(g2)?;
                let shares = shares
                    .iter()
                    .enumerate()
                    .map(|(i, bytes)| {
                        Ok(EncryptedShare {
                            from: id,
                            to: i as ParticipantId + 1,
                            ciphertext: V::Ciphertext::decode(bytes)?,
                        })
                    })
                    .collect::<Result<Vec<_>, EncodingError>>()?;
                Ok((g1, g2, shares))
            });

            let (g1, g2, shares) = decoded.map_err(|e| {
                s.arbiter
                    .reject_malformed(account, id, Malformation::Encoding(e))
            })?;
            s.arbiter.submit_commitment(account, id, g1, g2, shares, now)?;
            Ok(())
        })
    }

    async fn complaint_private_commit(
        &self,
        account: &AccountHandle,
        complainer: ParticipantId,
        accused: ParticipantId,
        secret_key: &[u8],
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        // both evaluations of the accused's commitment
        let coefficients = 2 * state.arbiter.threshold() as Gas;
        let gas = state.gas.intrinsic(&[secret_key], 64)
            + coefficients * state.gas.complaint_coefficient;

        state.transact(account, gas, |s, now| {
            let secret = V::Scalar::decode(secret_key)
                .map_err(|e| s.arbiter.reject_malformed_key(complainer, accused, e))?;
            s.arbiter
                .file_complaint(account, complainer, accused, &secret, now)?;
            Ok(())
        })
    }

    async fn phase_change(&self, account: &AccountHandle) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        let gas = state.gas.intrinsic(&[], 32);
        state.transact(account, gas, |s, now| {
            s.arbiter.finalize(now)?;
            Ok(())
        })
    }

    async fn expire(&self, account: &AccountHandle) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        let gas = state.gas.intrinsic(&[], 32);
        state.transact(account, gas, |s, now| {
            s.arbiter.expire(now)?;
            Ok(())
        })
    }

    async fn mine(&self, blocks: BlockNumber) -> Result<BlockNumber, LedgerError> {
        let mut state = self.state.lock().await;
        state.block += blocks;
        debug!(blocks, block = state.block, "mined");
        Ok(state.block)
    }

    async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
        Ok(self.state.lock().await.block)
    }

    async fn current_phase(&self) -> Result<Phase, LedgerError> {
        Ok(self.state.lock().await.arbiter.phase())
    }

    async fn threshold(&self) -> Result<usize, LedgerError> {
        Ok(self.state.lock().await.arbiter.threshold())
    }

    async fn participant_count(&self) -> Result<usize, LedgerError> {
        Ok(self.state.lock().await.arbiter.participant_count())
    }

    async fn participants(&self) -> Result<Vec<(ParticipantId, V::G1)>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .arbiter
            .participants()
            .map(|p| (p.id, p.public_key.clone()))
            .collect())
    }

    async fn commitment(
        &self,
        id: ParticipantId,
    ) -> Result<Option<PolynomialCommitment<V>>, LedgerError> {
        Ok(self.state.lock().await.arbiter.commitment(id).cloned())
    }

    async fn share(
        &self,
        from: ParticipantId,
        to: ParticipantId,
    ) -> Result<Option<EncryptedShare<V>>, LedgerError> {
        Ok(self.state.lock().await.arbiter.share(from, to).cloned())
    }

    async fn complaint(&self) -> Result<Option<ComplaintRecord>, LedgerError> {
        Ok(self.state.lock().await.arbiter.complaint().cloned())
    }

    async fn group_public_key(&self) -> Result<Option<V::G2>, LedgerError> {
        Ok(self.state.lock().await.arbiter.group_public_key())
    }

    async fn member_public_key(&self, id: ParticipantId) -> Result<Option<V::G2>, LedgerError> {
        Ok(self.state.lock().await.arbiter.member_public_key(id))
    }

    async fn settlement(&self) -> Result<Option<Settlement>, LedgerError> {
        Ok(self.state.lock().await.arbiter.settlement().cloned())
    }

    async fn balance(&self, account: &AccountHandle) -> Result<Amount, LedgerError> {
        Ok(self.state.lock().await.balance(account))
    }

    async fn held(&self) -> Result<Amount, LedgerError> {
        Ok(self.state.lock().await.arbiter.held())
    }
}
