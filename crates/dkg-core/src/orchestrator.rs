//! # Orchestrator
//!
//! Drives a group of participants through a DKG instance on a [`Ledger`]:
//! enrollment, dealing, concurrent commits, an optional complaint and
//! finalization once the challenge window has passed.
use crate::{
    ledger::{Ledger, LedgerError, Receipt},
    primitives::{
        verify_private_commitment, AccountHandle, BlockNumber, ComplaintOutcome,
        ComplaintRecord, ConfigError, Contribution, ErrorKind, Gas, ParticipantId, Phase,
        ProtocolConfig, Reason, Settlement,
    },
    vss::VssProvider,
};

use futures::future::join_all;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, future::Future, marker::PhantomData, time::Duration};
use thiserror::Error;
use threshold_vss::encoding::{encode_flat, Encode};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The VSS provider could not deal or decrypt
    #[error("vss provider failed: {0}")]
    Vss(Box<dyn std::error::Error + Send + Sync>),
    /// The instance ended up somewhere the orchestrator did not drive it to
    #[error("instance is in phase {0} while {1}")]
    ProtocolFailure(Phase, &'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{what} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        what: &'static str,
        attempts: usize,
        source: LedgerError,
    },
    #[error("receipt is missing the {0} event")]
    MissingEvent(&'static str),
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("expected {expected} participants, got {actual}")]
    ParticipantCount { expected: usize, actual: usize },
    #[error("aborted before {0}")]
    Aborted(Stage),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(err) => err.kind(),
            Self::Vss(_) | Self::RetriesExhausted { .. } | Self::MissingEvent(_) => {
                ErrorKind::Resource
            }
            Self::ProtocolFailure(..) | Self::Aborted(_) => ErrorKind::ProtocolFailure,
            Self::Config(_) | Self::InvalidScenario(_) | Self::ParticipantCount { .. } => {
                ErrorKind::Validation
            }
        }
    }
}

/// Exponential backoff for transient ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per call, the first one included
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// The delay before retrying after the `attempt`-th failure
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as u32;
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Misbehaviour to inject into a run. `malicious` corrupts its share to
/// `complainer`, who then complains against `accused` (`malicious` unless
/// set). Accusing an honest dealer produces an unjustified complaint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub complainer: Option<ParticipantId>,
    pub malicious: Option<ParticipantId>,
    pub accused: Option<ParticipantId>,
}

impl Scenario {
    /// Returns the complaint to file, if any
    fn complaint(&self, n: usize) -> Result<Option<(ParticipantId, ParticipantId)>, OrchestratorError> {
        let in_range = |id: ParticipantId| id >= 1 && id as usize <= n;
        for id in [self.complainer, self.malicious, self.accused].iter().flatten() {
            if !in_range(*id) {
                return Err(OrchestratorError::InvalidScenario(format!(
                    "participant {} is not in [1,{}]",
                    id, n
                )));
            }
        }

        let complainer = match self.complainer {
            Some(complainer) => complainer,
            None if self.malicious.is_some() || self.accused.is_some() => {
                return Err(OrchestratorError::InvalidScenario(
                    "a misbehaving participant needs a complainer".to_owned(),
                ))
            }
            None => return Ok(None),
        };

        let accused = self.accused.or(self.malicious).ok_or_else(|| {
            OrchestratorError::InvalidScenario("the complainer has nobody to accuse".to_owned())
        })?;
        if accused == complainer {
            return Err(OrchestratorError::InvalidScenario(
                "participants cannot accuse themselves".to_owned(),
            ));
        }

        Ok(Some((complainer, accused)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub protocol: ProtocolConfig,
    pub retry: RetryPolicy,
    /// Delay between two polls of the block number
    pub poll_interval_ms: u64,
    /// Ask the ledger to mine the blocks missing from the challenge window
    /// instead of waiting for them
    pub mine_blocks: bool,
    /// Check every received share and complain about the first bad one
    pub auto_complain: bool,
    pub scenario: Scenario,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            retry: RetryPolicy::default(),
            poll_interval_ms: 1_000,
            mine_blocks: true,
            auto_complain: true,
            scenario: Scenario::default(),
        }
    }
}

/// The points at which a run can be paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enroll,
    Commit,
    Complaint,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Stage::Enroll => "enrollment",
            Stage::Commit => "commit",
            Stage::Complaint => "complaint",
            Stage::Finalize => "finalization",
        };
        f.write_str(s)
    }
}

/// Gas spent by a run, per operation and per participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasReport {
    pub join: Gas,
    pub commit: Gas,
    pub complaint: Gas,
    pub phase_change: Gas,
    pub per_participant: BTreeMap<ParticipantId, Gas>,
}

impl GasReport {
    pub fn total(&self) -> Gas {
        self.join + self.commit + self.complaint + self.phase_change
    }

    fn charge(&mut self, id: ParticipantId, receipt: &Receipt) -> Gas {
        *self.per_participant.entry(id).or_default() += receipt.gas_used;
        receipt.gas_used
    }
}

/// What a participant holds after a successful run
#[derive(Debug, Clone)]
pub struct MemberOutput<V: VssProvider> {
    pub id: ParticipantId,
    pub account: AccountHandle,
    /// The public key of `secret_share`
    pub public_key: V::G2,
    /// The sum of the shares dealt to this member
    pub secret_share: V::Scalar,
}

#[derive(Debug, Clone)]
pub struct RunReport<V: VssProvider> {
    /// `EndSuccess`, or `EndFail` after a complaint
    pub outcome: Phase,
    pub complaint: Option<ComplaintRecord>,
    pub settlement: Option<Settlement>,
    pub group_public_key: Option<V::G2>,
    /// Empty unless the run succeeded
    pub members: Vec<MemberOutput<V>>,
    pub gas: GasReport,
}

struct Client<V: VssProvider> {
    account: AccountHandle,
    secret: V::Scalar,
    public: V::G1,
    id: ParticipantId,
}

type Checkpoint = Box<dyn FnMut(Stage) -> bool>;

/// Runs every participant of one DKG instance against a ledger.
pub struct Orchestrator<V: VssProvider, L: Ledger<V>> {
    ledger: L,
    config: OrchestratorConfig,
    clients: Vec<Client<V>>,
    checkpoint: Option<Checkpoint>,
    gas: GasReport,
    _vss: PhantomData<V>,
}

impl<V, L> Orchestrator<V, L>
where
    V: VssProvider,
    L: Ledger<V>,
{
    /// `members` are the accounts which will enroll, in order, with their
    /// share decryption keys.
    pub fn new(
        ledger: L,
        config: OrchestratorConfig,
        members: Vec<(AccountHandle, V::Scalar)>,
    ) -> Result<Self, OrchestratorError> {
        config.protocol.validate()?;
        let expected = config.protocol.participant_count;
        if members.len() != expected {
            return Err(OrchestratorError::ParticipantCount {
                expected,
                actual: members.len(),
            });
        }
        config.scenario.complaint(expected)?;

        let clients = members
            .into_iter()
            .map(|(account, secret)| Client {
                public: V::public_key(&secret),
                account,
                secret,
                id: 0,
            })
            .collect();

        Ok(Self {
            ledger,
            config,
            clients,
            checkpoint: None,
            gas: GasReport::default(),
            _vss: PhantomData,
        })
    }

    /// Creates the members with fresh keys
    pub fn with_random_keys<R: RngCore>(
        ledger: L,
        config: OrchestratorConfig,
        accounts: Vec<AccountHandle>,
        rng: &mut R,
    ) -> Result<Self, OrchestratorError> {
        let members = accounts
            .into_iter()
            .map(|account| (account, V::keypair(rng).0))
            .collect();
        Self::new(ledger, config, members)
    }

    /// Called before each stage, the run is aborted if it returns false
    pub fn with_checkpoint(mut self, checkpoint: impl FnMut(Stage) -> bool + 'static) -> Self {
        self.checkpoint = Some(Box::new(checkpoint));
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn pause(&mut self, stage: Stage) -> Result<(), OrchestratorError> {
        if let Some(checkpoint) = self.checkpoint.as_mut() {
            if !checkpoint(stage) {
                return Err(OrchestratorError::Aborted(stage));
            }
        }
        Ok(())
    }

    async fn expect_phase(&self, phase: Phase, doing: &'static str) -> Result<(), OrchestratorError> {
        let current = self.current_phase().await?;
        if current != phase {
            return Err(OrchestratorError::ProtocolFailure(current, doing));
        }
        Ok(())
    }

    /// Runs the instance to completion.
    pub async fn run<R: RngCore>(&mut self, rng: &mut R) -> Result<RunReport<V>, OrchestratorError> {
        self.pause(Stage::Enroll)?;
        self.enroll().await?;
        self.expect_phase(Phase::Commit, "enrolling").await?;

        let contributions = self.deal(rng).await?;

        self.pause(Stage::Commit)?;
        self.commit(&contributions).await?;

        let complaint = self.config.scenario.complaint(self.clients.len())?;
        if complaint.is_some() || self.config.auto_complain {
            self.pause(Stage::Complaint)?;
        }
        let complaint = match complaint {
            Some(complaint) => Some(complaint),
            None if self.config.auto_complain => self.find_bad_share().await?,
            None => None,
        };

        if let Some((complainer, accused)) = complaint {
            let outcome = self.complain(complainer, accused).await?;
            if self.current_phase().await? == Phase::EndFail {
                info!(?outcome, "complaint closed the instance");
                return self.report(Phase::EndFail).await;
            }
        }

        self.pause(Stage::Finalize)?;
        self.finalize().await?;
        self.report(Phase::EndSuccess).await
    }

    async fn current_phase(&self) -> Result<Phase, OrchestratorError> {
        retry(&self.config.retry, "current_phase", || self.ledger.current_phase()).await
    }

    async fn enroll(&mut self) -> Result<(), OrchestratorError> {
        let deposit = self.config.protocol.deposit;
        for i in 0..self.clients.len() {
            let client = &self.clients[i];
            let (ledger, account) = (&self.ledger, &client.account);
            let public_key = client.public.encode();
            let public_key = public_key.as_slice();

            let receipt = retry(&self.config.retry, "join", move || {
                ledger.join(account, deposit, public_key)
            })
            .await?;
            let id = receipt
                .joined(account)
                .ok_or(OrchestratorError::MissingEvent("ParticipantJoined"))?;

            info!(id, account = %account, block = receipt.block, "joined");
            self.gas.join += self.gas.charge(id, &receipt);
            self.clients[i].id = id;
        }
        Ok(())
    }

    /// Every participant deals to the keys registered on the ledger
    async fn deal<R: RngCore>(&self, rng: &mut R) -> Result<Vec<Contribution<V>>, OrchestratorError> {
        let recipients = retry(&self.config.retry, "participants", || {
            self.ledger.participants()
        })
        .await?;
        let threshold = self.config.protocol.threshold;

        self.clients
            .iter()
            .map(|client| {
                V::generate_contribution(client.id, &recipients, threshold, rng)
                    .map_err(|e| OrchestratorError::Vss(Box::new(e)))
            })
            .collect()
    }

    /// Submits every contribution concurrently
    async fn commit(&mut self, contributions: &[Contribution<V>]) -> Result<(), OrchestratorError> {
        let scenario = &self.config.scenario;
        let calldata = self
            .clients
            .iter()
            .zip(contributions)
            .map(|(client, c)| {
                let mut shares = c
                    .shares
                    .iter()
                    .map(|s| s.ciphertext.encode())
                    .collect::<Vec<_>>();

                let victim = match scenario.complainer {
                    Some(to) if scenario.malicious == Some(client.id) => (to as usize).checked_sub(1),
                    _ => None,
                };
                if let Some(share) = victim.and_then(|i| shares.get_mut(i)) {
                    warn!(id = client.id, to = ?scenario.complainer, "tainting share");
                    if let Some(last) = share.last_mut() {
                        *last ^= 1;
                    }
                }

                (
                    client,
                    encode_flat(&c.commitment.g1),
                    encode_flat(&c.commitment.g2),
                    shares,
                )
            })
            .collect::<Vec<_>>();

        let (ledger, policy) = (&self.ledger, &self.config.retry);
        let submissions = calldata.iter().map(|(client, g1, g2, shares)| {
            let (account, id) = (&client.account, client.id);
            async move {
                let receipt = retry(policy, "commit", move || {
                    ledger.commit(account, id, g1, g2, shares)
                })
                .await?;
                if !receipt.committed(id) {
                    return Err(OrchestratorError::MissingEvent("NewCommit"));
                }
                debug!(id, block = receipt.block, gas = receipt.gas_used, "committed");
                Ok::<_, OrchestratorError>((id, receipt))
            }
        });

        let receipts = join_all(submissions)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        for (id, receipt) in &receipts {
            self.gas.commit += self.gas.charge(*id, receipt);
        }

        info!(committed = receipts.len(), "all commitments submitted");
        Ok(())
    }

    /// Checks every share received by every client. Returns the first
    /// `(complainer, accused)` pair whose share is inconsistent.
    async fn find_bad_share(&self) -> Result<Option<(ParticipantId, ParticipantId)>, OrchestratorError> {
        let policy = &self.config.retry;
        for client in &self.clients {
            for dealer in self.clients.iter().filter(|d| d.id != client.id) {
                let commitment = retry(policy, "commitment", || {
                    self.ledger.commitment(dealer.id)
                })
                .await?;
                let share = retry(policy, "share", || {
                    self.ledger.share(dealer.id, client.id)
                })
                .await?;

                let (commitment, share) = match (commitment, share) {
                    (Some(c), Some(s)) => (c, s),
                    _ => continue,
                };

                let verdict =
                    verify_private_commitment::<V>(&commitment, &share, client.id, &client.secret);
                if !verdict.commitments_consistent {
                    warn!(dealer = dealer.id, "G1 and G2 commitments differ");
                }
                if verdict.should_complain() {
                    warn!(
                        complainer = client.id,
                        accused = dealer.id,
                        evidence = ?verdict.evidence,
                        "bad share received"
                    );
                    return Ok(Some((client.id, dealer.id)));
                }
            }
        }

        debug!("every share verified");
        Ok(None)
    }

    async fn complain(
        &mut self,
        complainer: ParticipantId,
        accused: ParticipantId,
    ) -> Result<ComplaintOutcome, OrchestratorError> {
        let client = self
            .clients
            .iter()
            .find(|c| c.id == complainer)
            .ok_or_else(|| {
                OrchestratorError::InvalidScenario(format!("unknown complainer {}", complainer))
            })?;
        let (ledger, account) = (&self.ledger, &client.account);
        let secret = client.secret.encode();
        let secret = secret.as_slice();

        let receipt = retry(&self.config.retry, "complaint", move || {
            ledger.complaint_private_commit(account, complainer, accused, secret)
        })
        .await?;
        let outcome = receipt
            .complaint_outcome()
            .ok_or(OrchestratorError::MissingEvent("ComplaintResolved"))?;

        info!(complainer, accused, ?outcome, block = receipt.block, "complaint filed");
        self.gas.complaint += self.gas.charge(complainer, &receipt);
        Ok(outcome)
    }

    /// Waits for the challenge window, then moves the instance to `EndSuccess`
    async fn finalize(&mut self) -> Result<(), OrchestratorError> {
        let client = self
            .clients
            .first()
            .ok_or(OrchestratorError::ParticipantCount {
                expected: self.config.protocol.participant_count,
                actual: 0,
            })?;
        let (id, ledger, account) = (client.id, &self.ledger, &client.account);
        let policy = &self.config.retry;

        let receipt = loop {
            match retry(policy, "phase_change", move || ledger.phase_change(account)).await {
                Ok(receipt) => break receipt,
                Err(OrchestratorError::Ledger(err)) => match err.reason() {
                    Some(Reason::TimeoutNotElapsed { remaining }) => {
                        self.wait_blocks(*remaining).await?
                    }
                    Some(Reason::WrongPhase(phase)) => {
                        return Err(OrchestratorError::ProtocolFailure(*phase, "finalizing"))
                    }
                    _ => return Err(err.into()),
                },
                Err(err) => return Err(err),
            }
        };

        if !receipt.entered(Phase::EndSuccess) {
            return Err(OrchestratorError::MissingEvent("PhaseChange"));
        }
        info!(block = receipt.block, "instance finalized");
        self.gas.phase_change += self.gas.charge(id, &receipt);
        Ok(())
    }

    async fn wait_blocks(&self, blocks: BlockNumber) -> Result<(), OrchestratorError> {
        let policy = &self.config.retry;
        let start = retry(policy, "block_number", || self.ledger.block_number()).await?;
        let target = start + blocks;
        debug!(start, target, "waiting for the challenge window");

        if self.config.mine_blocks {
            retry(policy, "mine", || self.ledger.mine(blocks)).await?;
            return Ok(());
        }

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            tokio::time::sleep(interval).await;
            let block = retry(policy, "block_number", || self.ledger.block_number()).await?;
            if block >= target {
                return Ok(());
            }
        }
    }

    async fn report(&self, outcome: Phase) -> Result<RunReport<V>, OrchestratorError> {
        let policy = &self.config.retry;
        let ledger = &self.ledger;
        let complaint = retry(policy, "complaint", || ledger.complaint()).await?;
        let settlement = retry(policy, "settlement", || ledger.settlement()).await?;
        let group_public_key = retry(policy, "group_public_key", || ledger.group_public_key()).await?;

        let mut members = Vec::new();
        if outcome == Phase::EndSuccess {
            for client in &self.clients {
                members.push(self.member_output(client).await?);
            }
        }

        Ok(RunReport {
            outcome,
            complaint,
            settlement,
            group_public_key,
            members,
            gas: self.gas.clone(),
        })
    }

    /// Decrypts and sums the shares dealt to `client`
    async fn member_output(&self, client: &Client<V>) -> Result<MemberOutput<V>, OrchestratorError> {
        let policy = &self.config.retry;
        let mut received = Vec::with_capacity(self.clients.len());
        for dealer in &self.clients {
            let share = retry(policy, "share", || self.ledger.share(dealer.id, client.id))
                .await?
                .ok_or(OrchestratorError::ProtocolFailure(
                    Phase::EndSuccess,
                    "collecting shares",
                ))?;
            let clear = V::decrypt_share(&client.secret, &share.ciphertext)
                .map_err(|e| OrchestratorError::Vss(Box::new(e)))?;
            received.push(clear);
        }

        let public_key = retry(policy, "member_public_key", || {
            self.ledger.member_public_key(client.id)
        })
        .await?
        .ok_or(OrchestratorError::ProtocolFailure(
            Phase::EndSuccess,
            "deriving member keys",
        ))?;

        Ok(MemberOutput {
            id: client.id,
            account: client.account.clone(),
            public_key,
            secret_share: V::combine_shares(&received),
        })
    }
}

/// Calls `f` until it succeeds, backing off after transient failures.
/// Other failures are returned immediately.
async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut f: F,
) -> Result<T, OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(t) => return Ok(t),
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_attempts {
                    return Err(OrchestratorError::RetriesExhausted {
                        what,
                        attempts: attempt,
                        source: err,
                    });
                }

                let backoff = policy.backoff(attempt);
                warn!(what, attempt, ?backoff, error = %err, "transient ledger failure");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::InMemoryLedger,
        primitives::{ComplaintPolicy, Evidence},
        test_helpers::{account, config, TestVss, DEPOSIT, WINDOW},
    };
    use std::{cell::RefCell, rc::Rc};
    use threshold_vss::{
        curve::bn254::{Scalar, G2},
        group::Element,
        poly::{Eval, Poly},
    };

    type TestOrchestrator = Orchestrator<TestVss, InMemoryLedger<TestVss>>;

    async fn setup(n: usize, t: usize, scenario: Scenario) -> TestOrchestrator {
        setup_with(config(n, t), scenario).await
    }

    async fn setup_with(protocol: ProtocolConfig, scenario: Scenario) -> TestOrchestrator {
        let n = protocol.participant_count;
        let ledger = InMemoryLedger::<TestVss>::new(protocol.clone()).unwrap();
        let accounts = (1..=n as ParticipantId).map(account).collect::<Vec<_>>();
        for account in &accounts {
            ledger.fund(account, DEPOSIT).await;
        }

        let config = OrchestratorConfig {
            protocol,
            scenario,
            ..Default::default()
        };
        Orchestrator::with_random_keys(ledger, config, accounts, &mut rand::thread_rng()).unwrap()
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(4), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(100), Duration::from_millis(2_000));
    }

    #[test]
    fn scenarios() {
        let s = |complainer, malicious, accused| Scenario {
            complainer,
            malicious,
            accused,
        };
        assert_eq!(s(None, None, None).complaint(5).unwrap(), None);
        assert_eq!(s(Some(2), Some(1), None).complaint(5).unwrap(), Some((2, 1)));
        assert_eq!(s(Some(2), Some(1), Some(3)).complaint(5).unwrap(), Some((2, 3)));
        assert_eq!(s(Some(2), None, Some(3)).complaint(5).unwrap(), Some((2, 3)));

        assert!(s(None, Some(1), None).complaint(5).is_err());
        assert!(s(Some(2), None, None).complaint(5).is_err());
        assert!(s(Some(2), Some(2), None).complaint(5).is_err());
        assert!(s(Some(6), Some(1), None).complaint(5).is_err());
        assert!(s(Some(0), Some(1), None).complaint(5).is_err());
    }

    #[tokio::test]
    async fn happy_path() {
        let (n, t) = (5, 2);
        let mut orchestrator = setup(n, t, Scenario::default()).await;
        let report = orchestrator.run(&mut rand::thread_rng()).await.unwrap();

        assert_eq!(report.outcome, Phase::EndSuccess);
        assert!(report.complaint.is_none());
        let settlement = report.settlement.unwrap();
        for id in 1..=n as ParticipantId {
            assert_eq!(settlement.payout(id), DEPOSIT);
        }

        let ledger = orchestrator.ledger();
        for id in 1..=n as ParticipantId {
            assert_eq!(ledger.balance(&account(id)).await.unwrap(), DEPOSIT);
        }
        assert!(ledger.block_number().await.unwrap() >= 2 * n as BlockNumber + WINDOW);

        assert_eq!(report.gas.per_participant.len(), n);
        assert!(report.gas.join > 0 && report.gas.commit > report.gas.join);
        assert_eq!(report.gas.complaint, 0);
        assert_eq!(
            report.gas.total(),
            report.gas.per_participant.values().sum::<Gas>()
        );

        // every member key matches its share, and any t shares recover the
        // secret behind the group key
        let group_public_key = report.group_public_key.unwrap();
        let mut evals = Vec::new();
        for member in &report.members {
            let mut public = G2::one();
            public.mul(&member.secret_share);
            assert_eq!(public, member.public_key);
            evals.push(Eval {
                value: member.secret_share,
                index: member.id,
            });
        }
        let secret = Poly::<Scalar>::recover(t, evals[2..].to_vec()).unwrap();
        let mut public = G2::one();
        public.mul(&secret);
        assert_eq!(public, group_public_key);
    }

    #[tokio::test]
    async fn malicious_dealer_is_punished() {
        let scenario = Scenario {
            complainer: Some(2),
            malicious: Some(1),
            accused: None,
        };
        let mut orchestrator = setup(5, 2, scenario).await;
        let report = orchestrator.run(&mut rand::thread_rng()).await.unwrap();

        assert_eq!(report.outcome, Phase::EndFail);
        let complaint = report.complaint.unwrap();
        assert_eq!(complaint.outcome, ComplaintOutcome::Justified);
        assert_eq!(complaint.evidence, Some(Evidence::Undecryptable));
        assert!(report.members.is_empty());
        assert!(report.group_public_key.is_none());
        assert!(report.gas.complaint > 0);

        let settlement = report.settlement.unwrap();
        assert_eq!(settlement.payout(1), 0);
        for id in 2..=5 {
            assert_eq!(settlement.payout(id), DEPOSIT + DEPOSIT / 4);
        }
    }

    #[tokio::test]
    async fn false_accusation_is_punished() {
        let scenario = Scenario {
            complainer: Some(2),
            malicious: None,
            accused: Some(1),
        };
        let mut orchestrator = setup(5, 2, scenario).await;
        let report = orchestrator.run(&mut rand::thread_rng()).await.unwrap();

        assert_eq!(report.outcome, Phase::EndFail);
        assert_eq!(report.complaint.unwrap().outcome, ComplaintOutcome::Unjustified);
        let settlement = report.settlement.unwrap();
        assert_eq!(settlement.payout(2), 0);
        for id in [1, 3, 4, 5] {
            assert_eq!(settlement.payout(id), DEPOSIT + DEPOSIT / 4);
        }
    }

    #[tokio::test]
    async fn false_accusation_can_still_succeed() {
        let mut protocol = config(4, 3);
        protocol.complaint_policy = ComplaintPolicy::ContinueOnUnjustified;
        let scenario = Scenario {
            complainer: Some(4),
            malicious: None,
            accused: Some(2),
        };
        let mut orchestrator = setup_with(protocol, scenario).await;
        let report = orchestrator.run(&mut rand::thread_rng()).await.unwrap();

        assert_eq!(report.outcome, Phase::EndSuccess);
        assert_eq!(report.members.len(), 4);
        assert_eq!(report.settlement.unwrap().payout(4), 0);
    }

    #[tokio::test]
    async fn honest_participants_detect_bad_shares() {
        // the tainted share is found without being told who to accuse
        let mut orchestrator = setup(3, 2, Scenario::default()).await;
        orchestrator.config.scenario.malicious = Some(3);
        orchestrator.config.scenario.complainer = Some(1);

        let rng = &mut rand::thread_rng();
        orchestrator.enroll().await.unwrap();
        let contributions = orchestrator.deal(rng).await.unwrap();
        orchestrator.commit(&contributions).await.unwrap();

        assert_eq!(orchestrator.find_bad_share().await.unwrap(), Some((1, 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_outages() {
        let mut orchestrator = setup(3, 2, Scenario::default()).await;
        orchestrator.ledger().inject_outage(3).await;
        let report = orchestrator.run(&mut rand::thread_rng()).await.unwrap();
        assert_eq!(report.outcome, Phase::EndSuccess);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let mut orchestrator = setup(3, 2, Scenario::default()).await;
        let attempts = orchestrator.config.retry.max_attempts;
        orchestrator.ledger().inject_outage(attempts).await;

        let err = orchestrator.run(&mut rand::thread_rng()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::RetriesExhausted { what: "join", .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_blocks_without_mining() {
        let mut orchestrator = setup(2, 1, Scenario::default()).await;
        orchestrator.config.mine_blocks = false;
        orchestrator.config.auto_complain = false;

        // somebody else keeps producing blocks
        let ledger = orchestrator.ledger().clone();
        let producer = async move {
            for _ in 0..WINDOW * 2 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ledger::<TestVss>::mine(&ledger, 1).await.unwrap();
            }
        };

        let rng = &mut rand::thread_rng();
        let (report, _) = futures::join!(orchestrator.run(rng), producer);
        assert_eq!(report.unwrap().outcome, Phase::EndSuccess);
    }

    #[tokio::test]
    async fn checkpoint_can_abort() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let mut orchestrator = setup(2, 1, Scenario::default())
            .await
            .with_checkpoint(move |stage| {
                log.borrow_mut().push(stage);
                stage != Stage::Finalize
            });

        let err = orchestrator.run(&mut rand::thread_rng()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Aborted(Stage::Finalize)));
        assert_eq!(
            *seen.borrow(),
            vec![Stage::Enroll, Stage::Commit, Stage::Complaint, Stage::Finalize]
        );
        let phase = orchestrator.ledger().current_phase().await.unwrap();
        assert_eq!(phase, Phase::PostCommit);
    }

    #[tokio::test]
    async fn rejects_wrong_member_count() {
        let ledger = InMemoryLedger::<TestVss>::new(config(3, 2)).unwrap();
        let config = OrchestratorConfig {
            protocol: config(3, 2),
            ..Default::default()
        };
        let err = TestOrchestrator::with_random_keys(
            ledger,
            config,
            vec![account(1)],
            &mut rand::thread_rng(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            OrchestratorError::ParticipantCount {
                expected: 3,
                actual: 1
            }
        ));
    }
}
