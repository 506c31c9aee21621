//! The batch transaction processor.
//!
//! `process_txs` is the consensus-critical state transition: it applies the
//! ordered L1 user txs, L1 coordinator txs and selected L2 txs to the
//! StateDB, enforces every validity rule, tracks exits and collected fees,
//! and (in batch-builder mode) assembles the `ZkInputs` witness. It never
//! persists: the caller commits the checkpoint, or resets on error.
//!
//! Soft vs. hard failures follow the on-chain semantics: an unsatisfiable
//! L1 tx is consumed with its amounts zeroed ("applied-zero"), while any
//! invalid L2 tx aborts the whole batch.

use std::collections::BTreeMap;

use num_bigint::BigUint;
use num_traits::Zero;
use rollup_merkle_tree::{MemoryDb, MerkleTree, TreeError, TreeUpdate};
use rollup_state::{StateDb, StateDbKind, StateError};
use rollup_types::{
    any_eth_addr,
    tx::{data_availability_bytes, SIGNATURE_CONSTANT},
    Account, Address, BatchNum, BjjPubKey, CodecError, EddsaSignature, ExitInfo, Float40, Idx,
    L1Tx, Nonce, PoolL2Tx, TokenId, TxType, ZkInputs,
};
use rollup_types::tx::ExitProof;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum TxProcessorError {
    #[error("batch has {got} txs, circuit fits {max}")]
    TooManyTxs { got: usize, max: usize },
    #[error("batch has {got} L1 txs, circuit fits {max}")]
    TooManyL1Txs { got: usize, max: usize },
    #[error("{got} coordinator fee idxs, circuit fits {max}")]
    TooManyCoordIdxs { got: usize, max: usize },
    #[error("tx from {idx} carries nonce {got}, account nonce is {expected}")]
    NonceMismatch { idx: Idx, expected: Nonce, got: Nonce },
    #[error("invalid signature on tx from {0}")]
    InvalidSignature(Idx),
    #[error("tx from {idx} expired: max batch {max_num_batch}, forging batch {batch_num}")]
    TxExpired { idx: Idx, max_num_batch: u64, batch_num: BatchNum },
    #[error("tx from {idx} moves token {tx_token}, account holds {account_token}")]
    TokenMismatch { idx: Idx, tx_token: TokenId, account_token: TokenId },
    #[error("recipient {to_idx} holds token {account_token}, tx moves {tx_token}")]
    RecipientTokenMismatch { to_idx: Idx, tx_token: TokenId, account_token: TokenId },
    #[error("account {idx} balance {balance} cannot cover {required}")]
    InsufficientBalance { idx: Idx, balance: BigUint, required: BigUint },
    #[error("invalid transfer destination {0}")]
    InvalidToIdx(Idx),
    #[error("no account for the destination address of tx from {0}")]
    UnresolvedDestination(Idx),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] rollup_crypto::CryptoError),
}

/// Circuit bounds the processor enforces; fixed per rollup instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxProcessorConfig {
    pub n_levels: u32,
    pub max_tx: usize,
    pub max_l1_tx: usize,
    pub max_fee_tx: usize,
    pub chain_id: u16,
}

#[derive(Debug)]
pub struct ProcessTxOutput {
    /// Witness for the proving circuit; batch-builder flavor only.
    pub zk_inputs: Option<Box<ZkInputs>>,
    /// One entry per applied exit, carrying the final exit-leaf proof.
    pub exit_infos: Vec<ExitInfo>,
    /// Accounts created by this batch; synchronizer flavor only.
    pub created_accounts: Vec<Account>,
    /// Fees accumulated per coordinator token.
    pub collected_fees: BTreeMap<TokenId, BigUint>,
    pub new_state_root: BigUint,
    pub new_exit_root: BigUint,
    pub new_last_idx: Idx,
    pub batch_num: BatchNum,
}

/// Per-batch working set.
struct BatchCtx {
    batch_num: BatchNum,
    exit_tree: MerkleTree<MemoryDb>,
    exit_accounts: BTreeMap<u64, Account>,
    exits: Vec<(Idx, BigUint)>,
    created_accounts: Vec<Account>,
    /// `(coordinator idx, token)` in coordinator order, one entry per token.
    fee_plan: Vec<(Idx, TokenId)>,
    acc_fees: Vec<BigUint>,
    collected_fees: BTreeMap<TokenId, BigUint>,
    zki: Option<Box<ZkInputs>>,
    slot: usize,
}

struct Effective {
    deposit: BigUint,
    amount: BigUint,
    /// The whole account creation is void (duplicate key triple).
    create_nullified: bool,
}

pub struct TxProcessor<'a> {
    state: &'a mut StateDb,
    config: TxProcessorConfig,
}

impl<'a> TxProcessor<'a> {
    pub fn new(state: &'a mut StateDb, config: TxProcessorConfig) -> Self {
        TxProcessor { state, config }
    }

    /// Applies one batch in the mandatory order: L1 user txs, L1 coordinator
    /// txs, L2 txs, fee distribution.
    ///
    /// `l2_txs` is taken mutably: in synchronizer flavor nonces are filled
    /// in from the account state (call data does not carry them).
    pub fn process_txs(
        &mut self,
        coord_idxs: &[Idx],
        l1_user_txs: &[L1Tx],
        l1_coordinator_txs: &[L1Tx],
        l2_txs: &mut [PoolL2Tx],
    ) -> Result<ProcessTxOutput, TxProcessorError> {
        let n_l1 = l1_user_txs.len() + l1_coordinator_txs.len();
        let n_tx = n_l1 + l2_txs.len();
        if n_tx > self.config.max_tx {
            return Err(TxProcessorError::TooManyTxs { got: n_tx, max: self.config.max_tx });
        }
        if n_l1 > self.config.max_l1_tx {
            return Err(TxProcessorError::TooManyL1Txs { got: n_l1, max: self.config.max_l1_tx });
        }
        if coord_idxs.len() > self.config.max_fee_tx {
            return Err(TxProcessorError::TooManyCoordIdxs {
                got: coord_idxs.len(),
                max: self.config.max_fee_tx,
            });
        }

        let batch_num = self.state.current_batch().next();
        let zki = (self.state.kind() == StateDbKind::BatchBuilder).then(|| {
            Box::new(ZkInputs::new(
                self.config.n_levels,
                self.config.max_tx,
                self.config.max_l1_tx,
                self.config.max_fee_tx,
                self.config.chain_id,
                *self.state.last_idx(),
                self.state.root_biguint(),
                *batch_num,
            ))
        });
        let mut ctx = BatchCtx {
            batch_num,
            exit_tree: MerkleTree::new(MemoryDb::new(), self.config.n_levels),
            exit_accounts: BTreeMap::new(),
            exits: Vec::new(),
            created_accounts: Vec::new(),
            fee_plan: Vec::new(),
            acc_fees: Vec::new(),
            collected_fees: BTreeMap::new(),
            zki,
            slot: 0,
        };

        for tx in l1_user_txs.iter().chain(l1_coordinator_txs) {
            self.process_l1_tx(&mut ctx, tx)?;
        }
        self.build_fee_plan(&mut ctx, coord_idxs)?;
        for tx in l2_txs.iter_mut() {
            self.process_l2_tx(&mut ctx, tx)?;
        }
        self.pad_intermediate_states(&mut ctx);
        self.distribute_fees(&mut ctx)?;

        let exit_infos = self.collect_exit_infos(&ctx)?;
        let new_state_root = self.state.root_biguint();
        let new_exit_root = ctx.exit_tree.root_biguint();
        let new_last_idx = self.state.last_idx();
        if let Some(zki) = ctx.zki.as_deref_mut() {
            zki.meta.new_state_root = new_state_root.clone();
            zki.meta.new_exit_root = new_exit_root.clone();
            zki.meta.new_last_idx = *new_last_idx;
        }

        tracing::debug!(
            batch = %batch_num,
            txs = n_tx,
            exits = exit_infos.len(),
            "processed batch"
        );
        Ok(ProcessTxOutput {
            zk_inputs: ctx.zki,
            exit_infos,
            created_accounts: ctx.created_accounts,
            collected_fees: ctx.collected_fees,
            new_state_root,
            new_exit_root,
            new_last_idx,
            batch_num,
        })
    }

    // ---- L1 ----

    fn process_l1_tx(&mut self, ctx: &mut BatchCtx, tx: &L1Tx) -> Result<(), TxProcessorError> {
        let eff = self.effective_amounts(tx)?;
        let slot = ctx.slot;

        if let Some(zki) = ctx.zki.as_deref_mut() {
            zki.from_idx[slot] = BigUint::from(*tx.from_idx);
            zki.to_idx[slot] = BigUint::from(*tx.to_idx);
            zki.on_chain[slot] = BigUint::from(1u8);
            let deposit_f40 = Float40::encode(&tx.deposit_amount).map_err(CodecError::from)?;
            zki.load_amount_f[slot] = BigUint::from(deposit_f40.as_u64());
            zki.from_eth_addr[slot] = addr_to_biguint(&tx.from_eth_addr);
            if !tx.from_bjj.is_empty() {
                zki.from_bjj_compressed[slot] = bjj_bits(&tx.from_bjj);
            }
            zki.tx_compressed_data[slot] = l1_compressed_data(tx, self.config.chain_id);
        }

        let mut effective_from = tx.from_idx;
        match tx.tx_type {
            TxType::CreateAccountDeposit | TxType::CreateAccountDepositTransfer => {
                if !eff.create_nullified {
                    let account = Account {
                        idx: Idx::NULL,
                        token_id: tx.token_id,
                        nonce: Nonce(0),
                        balance: &eff.deposit - &eff.amount,
                        bjj: tx.from_bjj,
                        eth_addr: tx.from_eth_addr,
                    };
                    let (idx, update) = self.state.create_account(&account)?;
                    effective_from = idx;
                    let mut created = account.clone();
                    created.idx = idx;
                    if self.state.kind() == StateDbKind::Synchronizer {
                        ctx.created_accounts.push(created.clone());
                    }
                    if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
                        zki.aux_from_idx[slot] = BigUint::from(*idx);
                        zki.new_account[slot] = BigUint::from(1u8);
                        set_leaf1(zki, slot, &created, &update);
                    }
                    if tx.tx_type == TxType::CreateAccountDepositTransfer
                        && !eff.amount.is_zero()
                    {
                        self.credit(ctx, tx.to_idx, &eff.amount)?;
                    }
                } else {
                    tracing::warn!(
                        position = tx.position,
                        "duplicate account keys, creation consumed without effect"
                    );
                }
            }
            TxType::Deposit | TxType::DepositTransfer => {
                let pre = self.state.get_account(tx.from_idx)?;
                let mut acc = pre.clone();
                acc.balance += &eff.deposit;
                acc.balance -= &eff.amount;
                let update = self.state.update_account(tx.from_idx, &acc)?;
                if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
                    set_leaf1(zki, slot, &pre, &update);
                }
                if tx.tx_type == TxType::DepositTransfer && !eff.amount.is_zero() {
                    self.credit(ctx, tx.to_idx, &eff.amount)?;
                }
            }
            TxType::ForceTransfer => {
                let pre = self.state.get_account(tx.from_idx)?;
                let mut acc = pre.clone();
                acc.balance -= &eff.amount;
                let update = self.state.update_account(tx.from_idx, &acc)?;
                if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
                    set_leaf1(zki, slot, &pre, &update);
                }
                if !eff.amount.is_zero() {
                    self.credit(ctx, tx.to_idx, &eff.amount)?;
                }
            }
            TxType::ForceExit => {
                let pre = self.state.get_account(tx.from_idx)?;
                let mut acc = pre.clone();
                acc.balance -= &eff.amount;
                let update = self.state.update_account(tx.from_idx, &acc)?;
                if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
                    set_leaf1(zki, slot, &pre, &update);
                }
                if !eff.amount.is_zero() {
                    self.apply_exit(ctx, &pre, &eff.amount)?;
                }
            }
            _ => unreachable!("L1 txs only reach this path"),
        }

        if let Some(zki) = ctx.zki.as_deref_mut() {
            zki.meta.l1_txs_data.push(tx.to_wire_bytes()?.to_vec());
            zki.meta.l2_txs_data.push(data_availability_bytes(
                effective_from,
                tx.to_idx,
                &eff.amount,
                0,
                self.config.n_levels,
            )?);
        }
        self.seal_slot(ctx, true);
        Ok(())
    }

    /// Evaluates the on-chain soft-failure rules: what part of the tx (if
    /// any) can actually be applied. Amount legs zero out; the tx is still
    /// consumed either way.
    fn effective_amounts(&self, tx: &L1Tx) -> Result<Effective, TxProcessorError> {
        let mut eff = Effective {
            deposit: tx.deposit_amount.clone(),
            amount: tx.amount.clone(),
            create_nullified: false,
        };
        match tx.tx_type {
            TxType::CreateAccountDeposit | TxType::CreateAccountDepositTransfer => {
                let duplicate = self
                    .state
                    .get_idx_by_eth_addr_bjj(&tx.from_eth_addr, &tx.from_bjj, tx.token_id)?
                    .is_some();
                if duplicate {
                    eff.deposit = BigUint::default();
                    eff.amount = BigUint::default();
                    eff.create_nullified = true;
                    return Ok(eff);
                }
                if tx.tx_type == TxType::CreateAccountDepositTransfer {
                    if eff.deposit < eff.amount {
                        eff.amount = BigUint::default();
                    }
                    if !self.recipient_accepts(tx.to_idx, tx.token_id)? {
                        eff.amount = BigUint::default();
                    }
                }
            }
            _ => {
                // `from_idx` was validated on-chain against the last index,
                // so a missing account means corrupted state, not a soft
                // failure.
                let acc = self.state.get_account(tx.from_idx)?;
                if acc.eth_addr != tx.from_eth_addr || acc.token_id != tx.token_id {
                    eff.deposit = BigUint::default();
                    eff.amount = BigUint::default();
                    return Ok(eff);
                }
                if tx.tx_type == TxType::Deposit {
                    // A plain deposit has no transfer leg.
                    eff.amount = BigUint::default();
                }
                let has_amount_leg = matches!(
                    tx.tx_type,
                    TxType::DepositTransfer | TxType::ForceTransfer | TxType::ForceExit
                );
                if has_amount_leg && &acc.balance + &eff.deposit < eff.amount {
                    eff.amount = BigUint::default();
                }
                if matches!(tx.tx_type, TxType::DepositTransfer | TxType::ForceTransfer)
                    && !self.recipient_accepts(tx.to_idx, tx.token_id)?
                {
                    eff.amount = BigUint::default();
                }
            }
        }
        Ok(eff)
    }

    fn recipient_accepts(&self, to_idx: Idx, token_id: TokenId) -> Result<bool, TxProcessorError> {
        match self.state.get_account(to_idx) {
            Ok(recv) => Ok(recv.token_id == token_id),
            Err(StateError::AccountNotFound(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Credits `amount` to `to_idx`, recording the receiver leaf witness.
    fn credit(
        &mut self,
        ctx: &mut BatchCtx,
        to_idx: Idx,
        amount: &BigUint,
    ) -> Result<(), TxProcessorError> {
        let pre = self.state.get_account(to_idx)?;
        let mut acc = pre.clone();
        acc.balance += amount;
        let update = self.state.update_account(to_idx, &acc)?;
        if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
            set_leaf2(zki, ctx.slot, &pre, &update);
        }
        Ok(())
    }

    fn apply_exit(
        &mut self,
        ctx: &mut BatchCtx,
        from: &Account,
        amount: &BigUint,
    ) -> Result<(), TxProcessorError> {
        let new_exit = !ctx.exit_accounts.contains_key(&*from.idx);
        let leaf = ctx.exit_accounts.entry(*from.idx).or_insert_with(|| Account {
            idx: from.idx,
            token_id: from.token_id,
            nonce: Nonce(0),
            balance: BigUint::default(),
            bjj: from.bjj,
            eth_addr: from.eth_addr,
        });
        let pre = leaf.clone();
        leaf.balance += amount;
        let value = leaf.state_hash()?;
        let balance_after = leaf.balance.clone();
        let update = ctx.exit_tree.put(*from.idx, value)?;
        ctx.exits.push((from.idx, balance_after));
        if let Some(zki) = ctx.zki.as_deref_mut() {
            if new_exit {
                zki.new_exit[ctx.slot] = BigUint::from(1u8);
            }
            set_leaf2(zki, ctx.slot, &pre, &update);
        }
        Ok(())
    }

    // ---- L2 ----

    fn process_l2_tx(
        &mut self,
        ctx: &mut BatchCtx,
        tx: &mut PoolL2Tx,
    ) -> Result<(), TxProcessorError> {
        let sender = self.state.get_account(tx.from_idx)?;
        if sender.token_id != tx.token_id {
            return Err(TxProcessorError::TokenMismatch {
                idx: tx.from_idx,
                tx_token: tx.token_id,
                account_token: sender.token_id,
            });
        }
        if self.state.kind() == StateDbKind::Synchronizer {
            // Call data carries no nonce; forged txs were proven against the
            // state nonce, so it is reconstructed here.
            tx.nonce = sender.nonce;
        } else {
            if tx.nonce != sender.nonce {
                return Err(TxProcessorError::NonceMismatch {
                    idx: tx.from_idx,
                    expected: sender.nonce,
                    got: tx.nonce,
                });
            }
            if tx.max_num_batch != 0 && tx.max_num_batch < *ctx.batch_num {
                return Err(TxProcessorError::TxExpired {
                    idx: tx.from_idx,
                    max_num_batch: tx.max_num_batch,
                    batch_num: ctx.batch_num,
                });
            }
            let msg = tx.hash_to_sign(self.config.chain_id)?;
            let valid = rollup_crypto::eddsa::verify_poseidon(&sender.bjj.0, &tx.signature.0, &msg)
                .map_err(|_| TxProcessorError::InvalidSignature(tx.from_idx))?;
            if !valid {
                return Err(TxProcessorError::InvalidSignature(tx.from_idx));
            }
        }

        let aux_to_idx = self.resolve_destination(tx)?;
        let effective_to = aux_to_idx.unwrap_or(tx.to_idx);

        let fee_pos = ctx
            .fee_plan
            .iter()
            .position(|(_, token)| *token == tx.token_id);
        let fee = match fee_pos {
            Some(_) => tx.fee.fee_amount(&tx.amount),
            None => BigUint::default(),
        };
        let required = &tx.amount + &fee;
        if sender.balance < required {
            return Err(TxProcessorError::InsufficientBalance {
                idx: tx.from_idx,
                balance: sender.balance.clone(),
                required,
            });
        }

        let pre_sender = sender;
        let mut debited = pre_sender.clone();
        debited.balance -= &required;
        debited.nonce = debited.nonce.next();
        let update1 = self.state.update_account(tx.from_idx, &debited)?;

        if let Some(pos) = fee_pos {
            ctx.acc_fees[pos] += &fee;
            *ctx.collected_fees.entry(tx.token_id).or_default() += &fee;
        }

        if let Some(zki) = ctx.zki.as_deref_mut() {
            let slot = ctx.slot;
            zki.from_idx[slot] = BigUint::from(*tx.from_idx);
            zki.to_idx[slot] = BigUint::from(*tx.to_idx);
            if let Some(aux) = aux_to_idx {
                zki.aux_to_idx[slot] = BigUint::from(*aux);
            }
            zki.tx_compressed_data[slot] = tx.tx_compressed_data(self.config.chain_id)?;
            zki.tx_compressed_data_v2[slot] = tx.tx_compressed_data_v2()?;
            zki.to_eth_addr[slot] = addr_to_biguint(&tx.to_eth_addr);
            zki.to_bjj_ay[slot] = tx.to_bjj.sign_ay().1;
            zki.max_num_batch[slot] = BigUint::from(tx.max_num_batch);
            zki.rq_offset[slot] = BigUint::from(tx.rq_offset);
            zki.rq_tx_compressed_data_v2[slot] = tx.rq_tx_compressed_data_v2()?;
            zki.rq_to_eth_addr[slot] = addr_to_biguint(&tx.rq_to_eth_addr);
            zki.rq_to_bjj_ay[slot] = tx.rq_to_bjj.sign_ay().1;
            if tx.signature != EddsaSignature::EMPTY {
                let (r8x, r8y, s) = rollup_crypto::eddsa::sig_components(&tx.signature.0)?;
                zki.r8x[slot] = r8x;
                zki.r8y[slot] = r8y;
                zki.s[slot] = s;
            }
            if let Some(update) = &update1 {
                set_leaf1(zki, slot, &pre_sender, update);
            }
        }

        if tx.tx_type == TxType::Exit {
            // The debited account is the exit-leaf template (keys, token).
            self.apply_exit(ctx, &debited, &tx.amount)?;
        } else {
            let recv = self.state.get_account(effective_to)?;
            if recv.token_id != tx.token_id {
                return Err(TxProcessorError::RecipientTokenMismatch {
                    to_idx: effective_to,
                    tx_token: tx.token_id,
                    account_token: recv.token_id,
                });
            }
            let mut credited = recv.clone();
            credited.balance += &tx.amount;
            let update2 = self.state.update_account(effective_to, &credited)?;
            if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update2) {
                set_leaf2(zki, ctx.slot, &recv, &update);
            }
        }

        if let Some(zki) = ctx.zki.as_deref_mut() {
            let da_to = if tx.tx_type == TxType::Exit {
                Idx::EXIT
            } else {
                effective_to
            };
            zki.meta.l2_txs_data.push(data_availability_bytes(
                tx.from_idx,
                da_to,
                &tx.amount,
                tx.fee.0,
                self.config.n_levels,
            )?);
        }
        self.seal_slot(ctx, false);
        Ok(())
    }

    /// Resolves `to_idx == 0` destinations against the current state. A
    /// missing destination account is a hard error: the coordinator must
    /// have created it earlier in this batch via an L1 coordinator tx.
    fn resolve_destination(&self, tx: &PoolL2Tx) -> Result<Option<Idx>, TxProcessorError> {
        match tx.tx_type {
            TxType::Exit => {
                if tx.to_idx != Idx::EXIT {
                    return Err(TxProcessorError::InvalidToIdx(tx.to_idx));
                }
                Ok(None)
            }
            TxType::Transfer => {
                if !tx.to_idx.is_user() {
                    return Err(TxProcessorError::InvalidToIdx(tx.to_idx));
                }
                Ok(None)
            }
            TxType::TransferToEthAddr => self
                .state
                .get_idx_by_eth_addr(&tx.to_eth_addr, tx.token_id)?
                .map(Some)
                .ok_or(TxProcessorError::UnresolvedDestination(tx.from_idx)),
            TxType::TransferToBjj => {
                let resolved = if tx.to_eth_addr == any_eth_addr() {
                    self.state.get_idx_by_bjj(&tx.to_bjj, tx.token_id)?
                } else {
                    self.state
                        .get_idx_by_eth_addr_bjj(&tx.to_eth_addr, &tx.to_bjj, tx.token_id)?
                };
                resolved
                    .map(Some)
                    .ok_or(TxProcessorError::UnresolvedDestination(tx.from_idx))
            }
            _ => Err(TxProcessorError::InvalidToIdx(tx.to_idx)),
        }
    }

    // ---- fees ----

    /// Maps coordinator idxs to the tokens they collect for. Runs after L1
    /// processing so fee accounts created by this batch's coordinator txs
    /// participate. Unknown idxs are skipped; extra idxs for an
    /// already-covered token are ignored.
    fn build_fee_plan(
        &mut self,
        ctx: &mut BatchCtx,
        coord_idxs: &[Idx],
    ) -> Result<(), TxProcessorError> {
        for &idx in coord_idxs {
            match self.state.get_account(idx) {
                Ok(acc) => {
                    if ctx.fee_plan.iter().any(|(_, token)| *token == acc.token_id) {
                        continue;
                    }
                    ctx.fee_plan.push((idx, acc.token_id));
                    ctx.acc_fees.push(BigUint::default());
                    ctx.collected_fees.insert(acc.token_id, BigUint::default());
                }
                Err(StateError::AccountNotFound(_)) => {
                    tracing::warn!("coordinator fee idx {idx} has no account, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Credits each coordinator account with its accumulated fees, in
    /// `coord_idxs` order.
    fn distribute_fees(&mut self, ctx: &mut BatchCtx) -> Result<(), TxProcessorError> {
        if let Some(zki) = ctx.zki.as_deref_mut() {
            zki.im_init_state_root_fee = self.state.root_biguint();
        }
        for j in 0..self.config.max_fee_tx {
            if let Some(&(idx, token)) = ctx.fee_plan.get(j) {
                let fee = ctx.acc_fees[j].clone();
                if let Some(zki) = ctx.zki.as_deref_mut() {
                    zki.fee_idxs[j] = BigUint::from(*idx);
                    zki.fee_plan_tokens[j] = BigUint::from(*token);
                    zki.im_final_acc_fee[j] = fee.clone();
                }
                if !fee.is_zero() {
                    let pre = self.state.get_account(idx)?;
                    let mut acc = pre.clone();
                    acc.balance += &fee;
                    let update = self.state.update_account(idx, &acc)?;
                    if let (Some(zki), Some(update)) = (ctx.zki.as_deref_mut(), update) {
                        let (sign, ay) = pre.bjj.sign_ay();
                        zki.token_id3[j] = BigUint::from(*pre.token_id);
                        zki.nonce3[j] = BigUint::from(*pre.nonce);
                        zki.sign3[j] = BigUint::from(sign as u8);
                        zki.ay3[j] = ay;
                        zki.balance3[j] = pre.balance.clone();
                        zki.eth_addr3[j] = addr_to_biguint(&pre.eth_addr);
                        zki.siblings3[j] = update.siblings.iter().map(fr_dec).collect();
                    }
                }
            }
            if let Some(zki) = ctx.zki.as_deref_mut() {
                if j < self.config.max_fee_tx - 1 {
                    zki.im_state_root_fee[j] = self.state.root_biguint();
                }
            }
        }
        Ok(())
    }

    // ---- witness chaining ----

    fn seal_slot(&self, ctx: &mut BatchCtx, on_chain: bool) {
        if let Some(zki) = ctx.zki.as_deref_mut() {
            let i = ctx.slot;
            if i < self.config.max_tx - 1 {
                zki.im_state_root[i] = self.state.root_biguint();
                zki.im_exit_root[i] = ctx.exit_tree.root_biguint();
                zki.im_acc_fee_out[i] = padded_fees(&ctx.acc_fees, self.config.max_fee_tx);
                zki.im_out_idx[i] = BigUint::from(*self.state.last_idx());
                zki.im_on_chain[i] = BigUint::from(on_chain as u8);
            }
        }
        ctx.slot += 1;
    }

    /// Unused tx slots chain the final pre-fee state forward.
    fn pad_intermediate_states(&self, ctx: &mut BatchCtx) {
        let Some(zki) = ctx.zki.as_deref_mut() else {
            return;
        };
        for i in ctx.slot..self.config.max_tx.saturating_sub(1) {
            zki.im_state_root[i] = self.state.root_biguint();
            zki.im_exit_root[i] = ctx.exit_tree.root_biguint();
            zki.im_acc_fee_out[i] = padded_fees(&ctx.acc_fees, self.config.max_fee_tx);
            zki.im_out_idx[i] = BigUint::from(*self.state.last_idx());
        }
    }

    fn collect_exit_infos(&self, ctx: &BatchCtx) -> Result<Vec<ExitInfo>, TxProcessorError> {
        let mut infos = Vec::with_capacity(ctx.exits.len());
        for (idx, balance) in &ctx.exits {
            let proof = ctx.exit_tree.get_proof(**idx)?;
            infos.push(ExitInfo {
                account_idx: *idx,
                batch_num: ctx.batch_num,
                balance: balance.clone(),
                merkle_proof: ExitProof {
                    root: ctx.exit_tree.root_biguint(),
                    siblings: proof.siblings_biguint(),
                },
                instant_withdrawn: None,
                delayed_withdraw_request: None,
            });
        }
        Ok(infos)
    }
}

// ---- helpers ----

fn addr_to_biguint(addr: &Address) -> BigUint {
    BigUint::from_bytes_be(addr.as_bytes())
}

fn fr_dec(value: &rollup_crypto::Fr) -> BigUint {
    rollup_crypto::fr_to_biguint(value)
}

fn padded_fees(acc_fees: &[BigUint], max_fee_tx: usize) -> Vec<BigUint> {
    let mut row = acc_fees.to_vec();
    row.resize(max_fee_tx, BigUint::default());
    row
}

fn bjj_bits(bjj: &BjjPubKey) -> Vec<BigUint> {
    (0..256)
        .map(|i| BigUint::from((bjj.0[i / 8] >> (i % 8)) & 1))
        .collect()
}

/// Compressed tx data of an on-chain tx: same layout as the L2 form, with
/// the amount-independent fields only.
fn l1_compressed_data(tx: &L1Tx, chain_id: u16) -> BigUint {
    let mut data = BigUint::from(SIGNATURE_CONSTANT);
    data |= BigUint::from(chain_id) << 32;
    data |= BigUint::from(*tx.from_idx) << 48;
    data |= BigUint::from(*tx.to_idx) << 96;
    data |= BigUint::from(*tx.token_id) << 144;
    data
}

fn set_leaf1(zki: &mut ZkInputs, slot: usize, pre: &Account, update: &TreeUpdate) {
    let (sign, ay) = pre.bjj.sign_ay();
    zki.token_id1[slot] = BigUint::from(*pre.token_id);
    zki.nonce1[slot] = BigUint::from(*pre.nonce);
    zki.sign1[slot] = BigUint::from(sign as u8);
    zki.ay1[slot] = ay;
    zki.balance1[slot] = pre.balance.clone();
    zki.eth_addr1[slot] = addr_to_biguint(&pre.eth_addr);
    zki.siblings1[slot] = update.siblings.iter().map(fr_dec).collect();
    zki.is_old0_1[slot] = BigUint::from(update.is_old0 as u8);
    zki.old_key1[slot] = fr_dec(&update.old_key);
    zki.old_value1[slot] = fr_dec(&update.old_value);
}

fn set_leaf2(zki: &mut ZkInputs, slot: usize, pre: &Account, update: &TreeUpdate) {
    let (sign, ay) = pre.bjj.sign_ay();
    zki.token_id2[slot] = BigUint::from(*pre.token_id);
    zki.nonce2[slot] = BigUint::from(*pre.nonce);
    zki.sign2[slot] = BigUint::from(sign as u8);
    zki.ay2[slot] = ay;
    zki.balance2[slot] = pre.balance.clone();
    zki.eth_addr2[slot] = addr_to_biguint(&pre.eth_addr);
    zki.siblings2[slot] = update.siblings.iter().map(fr_dec).collect();
    zki.is_old0_2[slot] = BigUint::from(update.is_old0 as u8);
    zki.old_key2[slot] = fr_dec(&update.old_key);
    zki.old_value2[slot] = fr_dec(&update.old_value);
}
