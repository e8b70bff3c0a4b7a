use crate::{opts::*, CLIError, CLIResult};

use anyhow::Result;
use dkg_core::{
    primitives::{
        verify_private_commitment, AccountHandle, ComplaintPolicy, ComplaintRecord,
        EncryptedShare, LocalVerdict, ParticipantId, Phase, PolynomialCommitment, Settlement,
    },
    GasReport, InMemoryLedger, Ledger, Orchestrator, OrchestratorConfig, PairingVss, VssProvider,
};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::HashMap, fs::File, io::Write, path::Path};
use threshold_vss::{
    curve::bn254::{PairingCurve, Scalar},
    encoding::Encode,
};
use tracing::info;

/// The DKG runs over BN254, the curve with precompiles on the EVM
pub type Vss = PairingVss<PairingCurve>;

type Ciphertext = <Vss as VssProvider>::Ciphertext;

#[derive(Serialize, Deserialize, Debug)]
pub struct KeypairJson {
    pub account: AccountHandle,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MemberJson {
    pub id: ParticipantId,
    pub account: AccountHandle,
    /// The share encryption key the member enrolled with
    pub private_key: String,
    /// The member's combined secret share, only when the DKG succeeded
    pub share: Option<String>,
    /// The public key of `share` in G2
    pub public_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RunJson {
    pub outcome: Phase,
    pub group_public_key: Option<String>,
    pub complaint: Option<ComplaintRecord>,
    pub settlement: Option<Settlement>,
    pub gas: GasReport,
    pub members: Vec<MemberJson>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShareJson {
    pub to: ParticipantId,
    pub ciphertext: String,
}

/// Everything one dealer published on the ledger
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub id: ParticipantId,
    pub public_key: String,
    pub pub_commit_g1: Vec<String>,
    pub pub_commit_g2: Vec<String>,
    pub encrypted_shares: Vec<ShareJson>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommitData {
    pub threshold: usize,
    pub participant_count: usize,
    pub records: Vec<CommitRecord>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyJson {
    #[serde(flatten)]
    pub verdict: LocalVerdict,
    pub should_complain: bool,
}

impl CommitRecord {
    pub fn commitment(&self) -> CLIResult<PolynomialCommitment<Vss>> {
        Ok(PolynomialCommitment {
            owner: self.id,
            g1: decode_all(&self.pub_commit_g1)?,
            g2: decode_all(&self.pub_commit_g2)?,
        })
    }

    pub fn share(&self, to: ParticipantId) -> CLIResult<EncryptedShare<Vss>> {
        let share = self
            .encrypted_shares
            .iter()
            .find(|share| share.to == to)
            .ok_or(CLIError::MissingShare { from: self.id, to })?;

        Ok(EncryptedShare {
            from: self.id,
            to,
            ciphertext: decode_hex::<Ciphertext>(&share.ciphertext)?,
        })
    }
}

pub fn keygen<R>(opts: KeygenOpts, rng: &mut R) -> Result<KeypairJson>
where
    R: RngCore,
{
    let (private_key, public_key) = Vss::keypair(rng);
    let output = KeypairJson {
        account: random_account(rng),
        private_key: hex::encode(private_key.encode()),
        public_key: hex::encode(public_key.encode()),
    };

    write_json(opts.path.as_deref(), &output)?;
    Ok(output)
}

/// Reads the orchestrator config, if any, and applies the command line overrides
pub fn load_config(opts: &RunOpts) -> Result<OrchestratorConfig> {
    let mut config: OrchestratorConfig = match &opts.config {
        Some(path) => read_json(path)?,
        None => OrchestratorConfig::default(),
    };

    let protocol = &mut config.protocol;
    if let Some(n) = opts.participants {
        protocol.participant_count = n;
        if opts.threshold.is_none() && protocol.threshold > n {
            protocol.threshold = n / 2 + 1;
        }
    }
    if let Some(t) = opts.threshold {
        protocol.threshold = t;
    }
    if let Some(deposit) = opts.deposit {
        protocol.deposit = deposit;
    }
    if let Some(window) = opts.challenge_window {
        protocol.challenge_window = window;
    }
    if let Some(policy) = &opts.policy {
        protocol.complaint_policy = match policy.as_str() {
            "close" => ComplaintPolicy::CloseOnAnyComplaint,
            "continue" => ComplaintPolicy::ContinueOnUnjustified,
            other => return Err(CLIError::InvalidPolicy(other.to_owned()).into()),
        };
    }

    let scenario = &mut config.scenario;
    scenario.complainer = opts.complainer.or(scenario.complainer);
    scenario.malicious = opts.malicious.or(scenario.malicious);
    scenario.accused = opts.accused.or(scenario.accused);

    Ok(config)
}

pub async fn run<R>(opts: RunOpts, rng: &mut R) -> Result<RunJson>
where
    R: RngCore,
{
    let config = load_config(&opts)?;
    let n = config.protocol.participant_count;
    let deposit = config.protocol.deposit;

    let ledger = InMemoryLedger::<Vss>::new(config.protocol.clone())?;
    let mut members = Vec::with_capacity(n);
    let mut keys = HashMap::with_capacity(n);
    for _ in 0..n {
        let account = random_account(rng);
        let (secret, public) = Vss::keypair(rng);
        ledger.fund(&account, deposit).await;
        keys.insert(public.encode(), (account.clone(), hex::encode(secret.encode())));
        members.push((account, secret));
    }

    let mut orchestrator = Orchestrator::<Vss, _>::new(ledger, config, members)?;
    if opts.interactive {
        orchestrator = orchestrator.with_checkpoint(|stage| {
            clt::confirm(
                &format!("\nProceed with the {} stage?", stage),
                true,
                "\n",
                true,
            )
        });
    }

    let report = orchestrator.run(rng).await?;
    info!(outcome = ?report.outcome, "DKG instance resolved");

    // members are listed even when the DKG failed, matched to their id by
    // the key they enrolled with
    let outputs: HashMap<_, _> = report
        .members
        .iter()
        .map(|member| (member.id, member))
        .collect();
    let mut members = Vec::with_capacity(n);
    for (id, public) in orchestrator.ledger().participants().await? {
        let (account, private_key) = match keys.remove(&public.encode()) {
            Some(member) => member,
            None => continue,
        };
        let output = outputs.get(&id);
        members.push(MemberJson {
            id,
            account,
            private_key,
            share: output.map(|m| hex::encode(m.secret_share.encode())),
            public_key: output.map(|m| hex::encode(m.public_key.encode())),
        });
    }

    let output = RunJson {
        outcome: report.outcome,
        group_public_key: report.group_public_key.map(|key| hex::encode(key.encode())),
        complaint: report.complaint,
        settlement: report.settlement,
        gas: report.gas,
        members,
    };
    write_json(opts.output.as_deref(), &output)?;

    if let Some(path) = &opts.commit_data {
        let data = export_commit_data(orchestrator.ledger()).await?;
        write_json(Some(path.as_str()), &data)?;
        info!(path = %path, dealers = data.records.len(), "exported commit data");
    }

    Ok(output)
}

/// Reads every published commitment and share back from the ledger
pub async fn export_commit_data<L: Ledger<Vss>>(ledger: &L) -> Result<CommitData> {
    let participants = ledger.participants().await?;

    let mut records = Vec::with_capacity(participants.len());
    for (id, public_key) in &participants {
        let commitment = match ledger.commitment(*id).await? {
            Some(commitment) => commitment,
            None => continue,
        };

        let mut encrypted_shares = Vec::with_capacity(participants.len());
        for (to, _) in &participants {
            if let Some(share) = ledger.share(*id, *to).await? {
                encrypted_shares.push(ShareJson {
                    to: *to,
                    ciphertext: hex::encode(share.ciphertext.encode()),
                });
            }
        }

        records.push(CommitRecord {
            id: *id,
            public_key: hex::encode(public_key.encode()),
            pub_commit_g1: commitment.g1.iter().map(|p| hex::encode(p.encode())).collect(),
            pub_commit_g2: commitment.g2.iter().map(|p| hex::encode(p.encode())).collect(),
            encrypted_shares,
        });
    }

    Ok(CommitData {
        threshold: ledger.threshold().await?,
        participant_count: ledger.participant_count().await?,
        records,
    })
}

pub fn verify(opts: VerifyOpts) -> Result<VerifyJson> {
    let data: CommitData = read_json(&opts.commit_data)?;
    let record = data
        .records
        .iter()
        .find(|record| record.id == opts.accused)
        .ok_or(CLIError::MissingRecord(opts.accused))?;

    let commitment = record.commitment()?;
    let share = record.share(opts.complainer)?;
    let secret = decode_hex::<Scalar>(&opts.key)?;

    let verdict = verify_private_commitment::<Vss>(&commitment, &share, opts.complainer, &secret);
    let output = VerifyJson {
        verdict,
        should_complain: verdict.should_complain(),
    };

    write_json(None, &output)?;
    Ok(output)
}

fn random_account<R: RngCore>(rng: &mut R) -> AccountHandle {
    let mut address = [0u8; 20];
    rng.fill_bytes(&mut address);
    AccountHandle::new(format!("0x{}", hex::encode(address)))
}

fn decode_hex<E: Encode>(s: &str) -> CLIResult<E> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    Ok(E::decode(&bytes)?)
}

fn decode_all<E: Encode>(items: &[String]) -> CLIResult<Vec<E>> {
    items.iter().map(|item| decode_hex(item)).collect()
}

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> CLIResult<T> {
    let f = File::open(path)?;
    Ok(serde_json::from_reader(f)?)
}

// writes to stdout when no path is provided
fn write_json<T: Serialize>(path: Option<&str>, value: &T) -> CLIResult<()> {
    match path {
        Some(path) => {
            let f = File::create(path)?;
            serde_json::to_writer_pretty(&f, value)?;
        }
        None => {
            let mut stdout = std::io::stdout();
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkg_core::primitives::{ComplaintOutcome, Evidence};
    use gumdrop::Options;
    use tempfile::tempdir;

    fn run_opts(args: &[&str]) -> RunOpts {
        RunOpts::parse_args_default(args).unwrap()
    }

    #[test]
    fn keygen_writes_a_valid_keypair() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keypair.json");
        let opts = KeygenOpts::parse_args_default(&["--path", path.to_str().unwrap()]).unwrap();
        keygen(opts, &mut rand::thread_rng()).unwrap();

        let keypair: KeypairJson = read_json(&path).unwrap();
        assert!(keypair.account.as_str().starts_with("0x"));
        assert_eq!(keypair.account.as_str().len(), 42);

        let secret = decode_hex::<Scalar>(&keypair.private_key).unwrap();
        let public = decode_hex::<<Vss as VssProvider>::G1>(&keypair.public_key).unwrap();
        assert_eq!(Vss::public_key(&secret), public);
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"protocol": {"participant_count": 7, "threshold": 4, "deposit": 10}}"#,
        )
        .unwrap();

        let config = load_config(&run_opts(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.protocol.participant_count, 7);
        assert_eq!(config.protocol.threshold, 4);
        assert_eq!(config.protocol.deposit, 10);
        assert_eq!(config.protocol.challenge_window, 11);

        let config = load_config(&run_opts(&[
            "--config",
            path.to_str().unwrap(),
            "-t",
            "5",
            "--policy",
            "continue",
            "--complainer",
            "2",
        ]))
        .unwrap();
        assert_eq!(config.protocol.threshold, 5);
        assert_eq!(
            config.protocol.complaint_policy,
            ComplaintPolicy::ContinueOnUnjustified
        );
        assert_eq!(config.scenario.complainer, Some(2));
    }

    #[test]
    fn participant_count_lowers_the_default_threshold() {
        let config = load_config(&run_opts(&["-n", "4"])).unwrap();
        assert_eq!(config.protocol.participant_count, 4);
        assert_eq!(config.protocol.threshold, 3);

        let err = load_config(&run_opts(&["--policy", "sometimes"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CLIError>(),
            Some(CLIError::InvalidPolicy(_))
        ));
    }

    #[tokio::test]
    async fn run_exports_shares_which_verify() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("output.json");
        let commit_data = dir.path().join("commit_data.json");
        let opts = run_opts(&[
            "-n",
            "4",
            "-t",
            "3",
            "-o",
            output.to_str().unwrap(),
            "--commit-data",
            commit_data.to_str().unwrap(),
        ]);

        let report = run(opts, &mut rand::thread_rng()).await.unwrap();
        assert_eq!(report.outcome, Phase::EndSuccess);
        assert!(report.group_public_key.is_some());
        assert_eq!(report.members.len(), 4);

        let written: RunJson = read_json(&output).unwrap();
        assert_eq!(written.group_public_key, report.group_public_key);

        let data: CommitData = read_json(&commit_data).unwrap();
        assert_eq!(data.threshold, 3);
        assert_eq!(data.records.len(), 4);
        for record in &data.records {
            assert_eq!(record.pub_commit_g1.len(), 3);
            assert_eq!(record.encrypted_shares.len(), 4);
        }

        for member in &report.members {
            let opts = VerifyOpts::parse_args_default(&[
                "--commit-data",
                commit_data.to_str().unwrap(),
                "--key",
                member.private_key.as_str(),
                "--complainer",
                &member.id.to_string(),
                "--accused",
                "1",
            ])
            .unwrap();
            let verdict = verify(opts).unwrap();
            assert!(!verdict.should_complain);
            assert!(verdict.verdict.commitments_consistent);
        }
    }

    #[tokio::test]
    async fn run_with_a_malicious_dealer_fails() {
        let dir = tempdir().unwrap();
        let commit_data = dir.path().join("commit_data.json");
        let opts = run_opts(&[
            "-n",
            "4",
            "-t",
            "2",
            "--deposit",
            "100",
            "--complainer",
            "2",
            "--malicious",
            "3",
            "-o",
            dir.path().join("output.json").to_str().unwrap(),
            "--commit-data",
            commit_data.to_str().unwrap(),
        ]);

        let report = run(opts, &mut rand::thread_rng()).await.unwrap();
        assert_eq!(report.outcome, Phase::EndFail);
        assert!(report.group_public_key.is_none());

        let complaint = report.complaint.unwrap();
        assert_eq!((complaint.complainer, complaint.accused), (2, 3));
        assert_eq!(complaint.outcome, ComplaintOutcome::Justified);

        let settlement = report.settlement.unwrap();
        assert_eq!(settlement.payout(3), 0);
        assert_eq!(settlement.total(), 400);

        // the tampered share is what ended up on the ledger
        let complainer = &report.members[1];
        assert_eq!(complainer.id, 2);
        let opts = VerifyOpts::parse_args_default(&[
            "--commit-data",
            commit_data.to_str().unwrap(),
            "--key",
            complainer.private_key.as_str(),
            "--complainer",
            "2",
            "--accused",
            "3",
        ])
        .unwrap();
        let verdict = verify(opts).unwrap();
        assert!(verdict.should_complain);
        assert_eq!(verdict.verdict.evidence, Evidence::Undecryptable);
    }

    #[test]
    fn verify_reports_missing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit_data.json");
        let data = CommitData {
            threshold: 1,
            participant_count: 1,
            records: vec![],
        };
        write_json(Some(path.to_str().unwrap()), &data).unwrap();

        let (secret, _) = Vss::keypair(&mut rand::thread_rng());
        let key = hex::encode(secret.encode());
        let opts = VerifyOpts::parse_args_default(&[
            "--commit-data",
            path.to_str().unwrap(),
            "--key",
            key.as_str(),
            "--complainer",
            "1",
            "--accused",
            "2",
        ])
        .unwrap();
        let err = verify(opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CLIError>(),
            Some(CLIError::MissingRecord(2))
        ));
    }
}
