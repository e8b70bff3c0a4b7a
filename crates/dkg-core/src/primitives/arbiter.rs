use super::{
    commitments::CommitmentLedger,
    complaint::{ComplaintOutcome, ComplaintRecord},
    config::{ComplaintPolicy, ConfigError, ProtocolConfig},
    errors::{DKGError, DKGResult, Malformation, Operation, Reason},
    escrow::{Escrow, Settlement},
    phase::{InvalidTransition, Phase, PhaseMachine},
    registry::Registry,
    types::{
        AccountHandle, Amount, BlockNumber, EncryptedShare, Gas, Participant, ParticipantId,
        PolynomialCommitment,
    },
};
use crate::vss::VssProvider;
use threshold_vss::encoding::EncodingError;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Emitted by the arbiter whenever its state changes. Ledgers attach the
/// events of a transaction to its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ParticipantJoined {
        id: ParticipantId,
        account: AccountHandle,
    },
    NewCommit {
        id: ParticipantId,
    },
    ComplaintResolved {
        complainer: ParticipantId,
        accused: ParticipantId,
        outcome: ComplaintOutcome,
    },
    PhaseChange {
        from: Phase,
        to: Phase,
        block: BlockNumber,
    },
    DepositReleased {
        id: ParticipantId,
        amount: Amount,
    },
}

/// The single authority over a DKG instance. It owns the registry, the
/// commitments, the phase, the complaint and the escrowed deposits, and
/// every mutation goes through it.
///
/// Rejected operations return a [`DKGError`] and leave the state untouched.
#[derive(Debug, Clone)]
pub struct Arbiter<V: VssProvider> {
    config: ProtocolConfig,
    phase: PhaseMachine,
    registry: Registry<V>,
    commitments: CommitmentLedger<V>,
    complaint: Option<ComplaintRecord>,
    escrow: Escrow,
    events: Vec<Event>,
}

impl<V: VssProvider> Arbiter<V> {
    /// Creates an instance in `Enrollment` at block `now`
    pub fn new(config: ProtocolConfig, now: BlockNumber) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            phase: PhaseMachine::new(now),
            registry: Registry::new(config.participant_count, config.deposit),
            commitments: CommitmentLedger::new(config.threshold, config.participant_count),
            complaint: None,
            escrow: Escrow::new(),
            events: Vec::new(),
            config,
        })
    }

    /// Enrolls `sender` with its share encryption key. The instance moves to
    /// `Commit` when the last slot is taken.
    pub fn enroll(
        &mut self,
        sender: AccountHandle,
        deposit: Amount,
        public_key: V::G1,
        now: BlockNumber,
    ) -> DKGResult<ParticipantId> {
        if self.phase() != Phase::Enrollment {
            return Err(self.reject(Operation::Enroll, Reason::RegistrationClosed));
        }

        if !V::is_valid_key(&public_key) {
            return Err(self.reject(Operation::Enroll, Reason::IdentityKey));
        }

        if !self.escrow.can_hold(deposit) {
            return Err(self.reject(Operation::Enroll, Reason::DepositOverflow(deposit)));
        }

        let id = self
            .registry
            .enroll(sender.clone(), deposit, public_key)
            .map_err(|reason| self.reject(Operation::Enroll, reason))?;
        self.escrow.deposit(id, deposit);

        info!(id, account = %sender, "participant enrolled");
        self.events.push(Event::ParticipantJoined {
            id,
            account: sender,
        });

        if self.registry.is_full() {
            self.transition(Phase::Commit, now)
                .map_err(|e| self.invalid(Operation::Enroll, e))?;
        }

        Ok(id)
    }

    /// Stores `id`'s commitment and encrypted shares. The instance moves to
    /// `PostCommit` once everybody has committed.
    ///
    /// Shares are not checked against the commitment here, that only
    /// happens when a complaint is filed.
    pub fn submit_commitment(
        &mut self,
        sender: &AccountHandle,
        id: ParticipantId,
        g1: Vec<V::G1>,
        g2: Vec<V::G2>,
        shares: Vec<EncryptedShare<V>>,
        now: BlockNumber,
    ) -> DKGResult<()> {
        self.check_submitter(sender, id)?;
        self.commitments
            .validate(id, &g1, &g2, &shares)
            .map_err(|m| self.malformed(id, m))?;

        self.commitments
            .insert(PolynomialCommitment { owner: id, g1, g2 }, shares);
        self.registry.mark_committed(id);

        debug!(id, committed = self.commitments.len(), "commitment stored");
        self.events.push(Event::NewCommit { id });

        if self.all_committed() {
            self.transition(Phase::PostCommit, now)
                .map_err(|e| self.invalid(Operation::SubmitCommitment, e))?;
        }

        Ok(())
    }

    /// Builds the error for a submission whose calldata could not be decoded.
    /// Authentication and replay errors take precedence over the malformation.
    pub fn reject_malformed(
        &self,
        sender: &AccountHandle,
        id: ParticipantId,
        malformation: Malformation,
    ) -> DKGError {
        match self.check_submitter(sender, id) {
            Err(err) => err,
            Ok(()) => self.malformed(id, malformation),
        }
    }

    /// Builds the error for a complaint whose secret key could not be decoded.
    /// A closed complaint window takes precedence over the malformed key.
    pub fn reject_malformed_key(
        &self,
        complainer: ParticipantId,
        accused: ParticipantId,
        error: EncodingError,
    ) -> DKGError {
        let reason = match self.check_complaint_open() {
            Err(reason) => reason,
            Ok(()) => Reason::MalformedKey(error),
        };
        self.reject(Operation::FileComplaint, reason)
            .involving(&[complainer, accused])
    }

    fn check_complaint_open(&self) -> Result<(), Reason> {
        if !matches!(self.phase(), Phase::Commit | Phase::PostCommit) {
            return Err(Reason::WrongPhase(self.phase()));
        }

        if self.complaint.is_some() {
            return Err(Reason::ComplaintAlreadyResolved);
        }

        Ok(())
    }

    fn check_submitter(&self, sender: &AccountHandle, id: ParticipantId) -> DKGResult<()> {
        let op = Operation::SubmitCommitment;
        self.registry
            .authenticate(sender, id)
            .map_err(|reason| self.reject(op, reason).involving(&[id]))?;

        // a replay is reported as such, whatever the phase
        if self.commitments.has_committed(id) {
            return Err(self.reject(op, Reason::DuplicateSubmission).involving(&[id]));
        }

        if self.phase() != Phase::Commit {
            return Err(self.reject(op, Reason::WrongPhase(self.phase())).involving(&[id]));
        }

        Ok(())
    }

    fn malformed(&self, id: ParticipantId, malformation: Malformation) -> DKGError {
        self.reject(
            Operation::SubmitCommitment,
            Reason::MalformedCommitment(malformation),
        )
        .involving(&[id])
    }

    /// Resolves `complainer`'s accusation that `accused` dealt it a share
    /// which does not match `accused`'s commitment. The complainer reveals its
    /// secret key so the share can be decrypted.
    pub fn file_complaint(
        &mut self,
        sender: &AccountHandle,
        complainer: ParticipantId,
        accused: ParticipantId,
        secret_key: &V::Scalar,
        now: BlockNumber,
    ) -> DKGResult<ComplaintOutcome> {
        let op = Operation::FileComplaint;
        let ids = [complainer, accused];
        let reject = |reason| self.reject(op, reason).involving(&ids);

        self.check_complaint_open().map_err(&reject)?;

        let public_key = match (self.registry.get(complainer), self.registry.get(accused)) {
            (Some(p), Some(_)) => &p.public_key,
            _ => return Err(reject(Reason::UnknownParticipant)),
        };

        self.registry
            .authenticate(sender, complainer)
            .map_err(&reject)?;

        if complainer == accused {
            return Err(reject(Reason::SelfComplaint));
        }

        if &V::public_key(secret_key) != public_key {
            return Err(reject(Reason::SecretKeyMismatch));
        }

        let (commitment, share) = match (
            self.commitments.commitment(accused),
            self.commitments.share(accused, complainer),
        ) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(reject(Reason::NoCommitment)),
        };

        let mut record = ComplaintRecord::new(complainer, accused, now);
        let outcome = record.resolve::<V>(commitment, share, secret_key);

        info!(complainer, accused, ?outcome, "complaint resolved");
        self.events.push(Event::ComplaintResolved {
            complainer,
            accused,
            outcome,
        });

        let forfeiting = match (outcome, self.config.complaint_policy) {
            (ComplaintOutcome::Justified, _) => Some(accused),
            (_, ComplaintPolicy::CloseOnAnyComplaint) => Some(complainer),
            // the complainer forfeits when the escrow is released
            (_, ComplaintPolicy::ContinueOnUnjustified) => None,
        };

        if let Some(id) = forfeiting {
            self.transition(Phase::EndFail, now)
                .map_err(|e| self.invalid(op, e))?;
            self.release(&[id]);
        }

        self.complaint = Some(record);
        Ok(outcome)
    }

    /// Closes the challenge window and releases the deposits. Only possible
    /// in `PostCommit` once `challenge_window` blocks have passed.
    pub fn finalize(&mut self, now: BlockNumber) -> DKGResult<Settlement> {
        let op = Operation::Finalize;
        if self.phase() != Phase::PostCommit {
            return Err(self.reject(op, Reason::WrongPhase(self.phase())));
        }

        let elapsed = self.phase.elapsed(now);
        if elapsed < self.config.challenge_window {
            let remaining = self.config.challenge_window - elapsed;
            return Err(self.reject(op, Reason::TimeoutNotElapsed { remaining }));
        }

        let forfeiting = self.unjustified_complainer().into_iter().collect::<Vec<_>>();
        self.transition(Phase::EndSuccess, now)
            .map_err(|e| self.invalid(op, e))?;
        Ok(self.release(&forfeiting))
    }

    /// Ends a stalled instance in `EndFail`.
    ///
    /// In `Enrollment` every deposit is refunded. In `Commit` the
    /// participants which did not commit forfeit their deposit to those which
    /// did.
    pub fn expire(&mut self, now: BlockNumber) -> DKGResult<Settlement> {
        let op = Operation::Expire;
        let timeout = match self.phase() {
            Phase::Enrollment => self.config.enrollment_timeout,
            Phase::Commit => self.config.commit_timeout,
            _ => None,
        };
        let timeout = match timeout {
            Some(timeout) => timeout,
            None => return Err(self.reject(op, Reason::WrongPhase(self.phase()))),
        };

        let elapsed = self.phase.elapsed(now);
        if elapsed < timeout {
            return Err(self.reject(
                op,
                Reason::TimeoutNotElapsed {
                    remaining: timeout - elapsed,
                },
            ));
        }

        let mut forfeiting = Vec::new();
        if self.phase() == Phase::Commit {
            forfeiting.extend(
                self.registry
                    .ids()
                    .filter(|id| !self.commitments.has_committed(*id)),
            );
            forfeiting.extend(self.unjustified_complainer());
        }

        warn!(phase = %self.phase(), ?forfeiting, "instance expired");
        self.transition(Phase::EndFail, now)
            .map_err(|e| self.invalid(op, e))?;
        Ok(self.release(&forfeiting))
    }

    fn unjustified_complainer(&self) -> Option<ParticipantId> {
        self.complaint
            .as_ref()
            .filter(|c| c.outcome == ComplaintOutcome::Unjustified)
            .map(|c| c.complainer)
    }

    fn transition(&mut self, next: Phase, now: BlockNumber) -> Result<(), InvalidTransition> {
        let from = self.phase();
        self.phase.advance(next, now)?;

        info!(%from, to = %next, block = now, "phase change");
        self.events.push(Event::PhaseChange {
            from,
            to: next,
            block: now,
        });
        Ok(())
    }

    // Only called when entering a terminal phase, so the escrow is always
    // still held.
    fn release(&mut self, forfeiting: &[ParticipantId]) -> Settlement {
        let settlement = self
            .escrow
            .settle(forfeiting)
            .cloned()
            .unwrap_or_default();

        for (id, amount) in &settlement.payouts {
            self.events.push(Event::DepositReleased {
                id: *id,
                amount: *amount,
            });
        }
        info!(
            forfeited = ?settlement.forfeited,
            unclaimed = settlement.unclaimed,
            "deposits released"
        );

        settlement
    }

    fn reject(&self, operation: Operation, reason: Reason) -> DKGError {
        debug!(%operation, phase = %self.phase(), %reason, "rejected");
        DKGError::new(operation, self.phase(), reason)
    }

    fn invalid(&self, operation: Operation, err: InvalidTransition) -> DKGError {
        self.reject(operation, Reason::WrongPhase(err.from))
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn threshold(&self) -> usize {
        self.config.threshold
    }

    pub fn participant_count(&self) -> usize {
        self.config.participant_count
    }

    pub fn phase(&self) -> Phase {
        self.phase.current()
    }

    /// Every phase entered so far, with the block it was entered at
    pub fn phase_history(&self) -> &[(Phase, BlockNumber)] {
        self.phase.history()
    }

    /// True iff every enrolled participant has committed
    pub fn all_committed(&self) -> bool {
        self.commitments.all_committed(self.registry.ids())
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant<V>> {
        self.registry.get(id)
    }

    pub fn participant_by_account(&self, account: &AccountHandle) -> Option<&Participant<V>> {
        self.registry
            .id_of(account)
            .and_then(|id| self.registry.get(id))
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant<V>> {
        self.registry.iter()
    }

    pub fn commitment(&self, id: ParticipantId) -> Option<&PolynomialCommitment<V>> {
        self.commitments.commitment(id)
    }

    pub fn share(&self, from: ParticipantId, to: ParticipantId) -> Option<&EncryptedShare<V>> {
        self.commitments.share(from, to)
    }

    pub fn complaint(&self) -> Option<&ComplaintRecord> {
        self.complaint.as_ref()
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.escrow.settlement()
    }

    /// Deposits still held in escrow
    pub fn held(&self) -> Amount {
        self.escrow.held()
    }

    /// The group's public key, once the DKG succeeded
    pub fn group_public_key(&self) -> Option<V::G2> {
        if self.phase() != Phase::EndSuccess {
            return None;
        }
        Some(V::group_public_key(self.commitments.commitments()))
    }

    /// The public key of `id`'s combined secret share, once the DKG succeeded
    pub fn member_public_key(&self, id: ParticipantId) -> Option<V::G2> {
        if self.phase() != Phase::EndSuccess || !self.registry.contains(id) {
            return None;
        }
        Some(V::member_public_key(self.commitments.commitments(), id))
    }

    /// Every event emitted so far, in order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Adds the gas of a transaction sent by `id`
    pub fn charge_gas(&mut self, id: ParticipantId, gas: Gas) {
        self.registry.charge_gas(id, gas);
    }
}
