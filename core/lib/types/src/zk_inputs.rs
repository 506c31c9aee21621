//! `ZkInputs`: the witness structure handed to the proving circuit.
//!
//! Array shapes are fixed by the circuit instance: per-tx arrays hold
//! `max_tx` slots, sibling paths `n_levels + 1` entries, intermediate-state
//! arrays `max_tx − 1`, and the fee suffix `max_fee_tx`. Every integer is
//! serialized as a decimal string, matching the circuit-input JSON format.

use num_bigint::BigUint;
use rollup_crypto::CryptoError;
use serde::{Deserialize, Serialize};

use crate::serde_wrappers::{biguint_dec, biguint_dec_mat, biguint_dec_vec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkInputs {
    // -- global scalars --
    #[serde(with = "biguint_dec")]
    pub old_last_idx: BigUint,
    #[serde(with = "biguint_dec")]
    pub old_state_root: BigUint,
    #[serde(with = "biguint_dec")]
    pub current_num_batch: BigUint,
    #[serde(rename = "globalChainID", with = "biguint_dec")]
    pub global_chain_id: BigUint,
    /// Coordinator accounts credited in the fee-distribution suffix.
    #[serde(with = "biguint_dec_vec")]
    pub fee_idxs: Vec<BigUint>,
    /// Tokens whose collected fees the circuit accumulates.
    #[serde(with = "biguint_dec_vec")]
    pub fee_plan_tokens: Vec<BigUint>,

    // -- per-tx slot data --
    #[serde(with = "biguint_dec_vec")]
    pub from_idx: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub aux_from_idx: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub to_idx: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub aux_to_idx: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub to_bjj_ay: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub to_eth_addr: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub from_eth_addr: Vec<BigUint>,
    /// Sender BJJ key as 256 little-endian bits per slot.
    #[serde(with = "biguint_dec_mat")]
    pub from_bjj_compressed: Vec<Vec<BigUint>>,
    /// On-chain deposit amount (Float40 bits) per slot.
    #[serde(rename = "loadAmountF", with = "biguint_dec_vec")]
    pub load_amount_f: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub max_num_batch: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub on_chain: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub new_account: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub new_exit: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub tx_compressed_data: Vec<BigUint>,
    #[serde(rename = "txCompressedDataV2", with = "biguint_dec_vec")]
    pub tx_compressed_data_v2: Vec<BigUint>,

    // -- signatures --
    #[serde(with = "biguint_dec_vec")]
    pub r8x: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub r8y: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub s: Vec<BigUint>,

    // -- linked-tx request fields --
    #[serde(with = "biguint_dec_vec")]
    pub rq_offset: Vec<BigUint>,
    #[serde(rename = "rqTxCompressedDataV2", with = "biguint_dec_vec")]
    pub rq_tx_compressed_data_v2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub rq_to_eth_addr: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub rq_to_bjj_ay: Vec<BigUint>,

    // -- sender leaf (pre-state) --
    #[serde(rename = "tokenID1", with = "biguint_dec_vec")]
    pub token_id1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub nonce1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub sign1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub ay1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub balance1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub eth_addr1: Vec<BigUint>,
    #[serde(with = "biguint_dec_mat")]
    pub siblings1: Vec<Vec<BigUint>>,
    #[serde(rename = "isOld0_1", with = "biguint_dec_vec")]
    pub is_old0_1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub old_key1: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub old_value1: Vec<BigUint>,

    // -- receiver / exit leaf (pre-state) --
    #[serde(rename = "tokenID2", with = "biguint_dec_vec")]
    pub token_id2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub nonce2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub sign2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub ay2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub balance2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub eth_addr2: Vec<BigUint>,
    #[serde(with = "biguint_dec_mat")]
    pub siblings2: Vec<Vec<BigUint>>,
    #[serde(rename = "isOld0_2", with = "biguint_dec_vec")]
    pub is_old0_2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub old_key2: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub old_value2: Vec<BigUint>,

    // -- fee-distribution leaves --
    #[serde(rename = "tokenID3", with = "biguint_dec_vec")]
    pub token_id3: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub nonce3: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub sign3: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub ay3: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub balance3: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub eth_addr3: Vec<BigUint>,
    #[serde(with = "biguint_dec_mat")]
    pub siblings3: Vec<Vec<BigUint>>,

    // -- intermediate states --
    #[serde(with = "biguint_dec_vec")]
    pub im_state_root: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub im_exit_root: Vec<BigUint>,
    #[serde(with = "biguint_dec_mat")]
    pub im_acc_fee_out: Vec<Vec<BigUint>>,
    #[serde(with = "biguint_dec_vec")]
    pub im_on_chain: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub im_out_idx: Vec<BigUint>,
    #[serde(with = "biguint_dec")]
    pub im_init_state_root_fee: BigUint,
    #[serde(with = "biguint_dec_vec")]
    pub im_state_root_fee: Vec<BigUint>,
    #[serde(with = "biguint_dec_vec")]
    pub im_final_acc_fee: Vec<BigUint>,

    /// Post-batch values and raw byte strings needed for the global-data
    /// hash; not part of the circuit-input JSON.
    #[serde(skip)]
    pub meta: ZkInputsMeta,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZkInputsMeta {
    pub n_levels: u32,
    pub max_tx: usize,
    pub max_l1_tx: usize,
    pub max_fee_tx: usize,
    pub new_last_idx: u64,
    pub new_state_root: BigUint,
    pub new_exit_root: BigUint,
    /// 78-byte on-chain records of the L1 prefix, in order.
    pub l1_txs_data: Vec<Vec<u8>>,
    /// Data-availability records of every applied tx slot, in order.
    pub l2_txs_data: Vec<Vec<u8>>,
}

impl ZkInputs {
    pub fn new(
        n_levels: u32,
        max_tx: usize,
        max_l1_tx: usize,
        max_fee_tx: usize,
        chain_id: u16,
        old_last_idx: u64,
        old_state_root: BigUint,
        batch_num: u64,
    ) -> Self {
        let zero = BigUint::default;
        let vec_tx = || vec![zero(); max_tx];
        let vec_fee = || vec![zero(); max_fee_tx];
        let siblings_tx = || vec![vec![zero(); n_levels as usize + 1]; max_tx];
        ZkInputs {
            old_last_idx: BigUint::from(old_last_idx),
            old_state_root,
            current_num_batch: BigUint::from(batch_num),
            global_chain_id: BigUint::from(chain_id),
            fee_idxs: vec_fee(),
            fee_plan_tokens: vec_fee(),
            from_idx: vec_tx(),
            aux_from_idx: vec_tx(),
            to_idx: vec_tx(),
            aux_to_idx: vec_tx(),
            to_bjj_ay: vec_tx(),
            to_eth_addr: vec_tx(),
            from_eth_addr: vec_tx(),
            from_bjj_compressed: vec![vec![zero(); 256]; max_tx],
            load_amount_f: vec_tx(),
            max_num_batch: vec_tx(),
            on_chain: vec_tx(),
            new_account: vec_tx(),
            new_exit: vec_tx(),
            tx_compressed_data: vec_tx(),
            tx_compressed_data_v2: vec_tx(),
            r8x: vec_tx(),
            r8y: vec_tx(),
            s: vec_tx(),
            rq_offset: vec_tx(),
            rq_tx_compressed_data_v2: vec_tx(),
            rq_to_eth_addr: vec_tx(),
            rq_to_bjj_ay: vec_tx(),
            token_id1: vec_tx(),
            nonce1: vec_tx(),
            sign1: vec_tx(),
            ay1: vec_tx(),
            balance1: vec_tx(),
            eth_addr1: vec_tx(),
            siblings1: siblings_tx(),
            is_old0_1: vec_tx(),
            old_key1: vec_tx(),
            old_value1: vec_tx(),
            token_id2: vec_tx(),
            nonce2: vec_tx(),
            sign2: vec_tx(),
            ay2: vec_tx(),
            balance2: vec_tx(),
            eth_addr2: vec_tx(),
            siblings2: siblings_tx(),
            is_old0_2: vec_tx(),
            old_key2: vec_tx(),
            old_value2: vec_tx(),
            token_id3: vec_fee(),
            nonce3: vec_fee(),
            sign3: vec_fee(),
            ay3: vec_fee(),
            balance3: vec_fee(),
            eth_addr3: vec_fee(),
            siblings3: vec![vec![zero(); n_levels as usize + 1]; max_fee_tx],
            im_state_root: vec![zero(); max_tx.saturating_sub(1)],
            im_exit_root: vec![zero(); max_tx.saturating_sub(1)],
            im_acc_fee_out: vec![vec_fee(); max_tx.saturating_sub(1)],
            im_on_chain: vec![zero(); max_tx.saturating_sub(1)],
            im_out_idx: vec![zero(); max_tx.saturating_sub(1)],
            im_init_state_root_fee: zero(),
            im_state_root_fee: vec![zero(); max_fee_tx.saturating_sub(1)],
            im_final_acc_fee: vec_fee(),
            meta: ZkInputsMeta {
                n_levels,
                max_tx,
                max_l1_tx,
                max_fee_tx,
                new_last_idx: old_last_idx,
                new_state_root: zero(),
                new_exit_root: zero(),
                l1_txs_data: Vec::new(),
                l2_txs_data: Vec::new(),
            },
        }
    }

    fn idx_bytes(&self) -> usize {
        (self.meta.n_levels / 8) as usize
    }

    /// The bit-exact byte string committed on-chain for this batch:
    ///
    /// `old_last_idx(6) || new_last_idx(6) || old_state_root(32) ||
    /// new_state_root(32) || new_exit_root(32) || L1 records padded to
    /// max_l1_tx·78 || data-availability records padded to
    /// max_tx·(2·idx_bytes + 6) || fee idxs padded to max_fee_tx·idx_bytes
    /// || chain_id(2) || batch_num(4)`.
    pub fn to_hash_global_data(&self) -> Vec<u8> {
        let idx_bytes = self.idx_bytes();
        let da_len = 2 * idx_bytes + 6;
        let mut out = Vec::new();

        let old_last_idx = biguint_to_u64(&self.old_last_idx);
        out.extend_from_slice(&old_last_idx.to_be_bytes()[2..]);
        out.extend_from_slice(&self.meta.new_last_idx.to_be_bytes()[2..]);
        out.extend_from_slice(&be32(&self.old_state_root));
        out.extend_from_slice(&be32(&self.meta.new_state_root));
        out.extend_from_slice(&be32(&self.meta.new_exit_root));

        for record in &self.meta.l1_txs_data {
            out.extend_from_slice(record);
        }
        out.resize(out.len() + (self.meta.max_l1_tx - self.meta.l1_txs_data.len()) * 78, 0);

        let da_written: usize = self.meta.l2_txs_data.iter().map(Vec::len).sum();
        for record in &self.meta.l2_txs_data {
            out.extend_from_slice(record);
        }
        out.resize(out.len() + self.meta.max_tx * da_len - da_written, 0);

        for fee_idx in &self.fee_idxs {
            let idx = biguint_to_u64(fee_idx);
            out.extend_from_slice(&idx.to_be_bytes()[8 - idx_bytes..]);
        }

        let chain_id = biguint_to_u64(&self.global_chain_id) as u16;
        out.extend_from_slice(&chain_id.to_be_bytes());
        let batch_num = biguint_to_u64(&self.current_num_batch) as u32;
        out.extend_from_slice(&batch_num.to_be_bytes());
        out
    }

    /// Poseidon digest of [`Self::to_hash_global_data`]; the public input
    /// committed to the proving circuit.
    pub fn hash_global_data(&self) -> Result<BigUint, CryptoError> {
        let digest = rollup_crypto::poseidon::hash_bytes(&self.to_hash_global_data())?;
        Ok(rollup_crypto::fr_to_biguint(&digest))
    }
}

fn be32(value: &BigUint) -> [u8; 32] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    out
}

fn biguint_to_u64(value: &BigUint) -> u64 {
    u64::try_from(value.clone()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_shapes_follow_config() {
        let zki = ZkInputs::new(16, 3, 2, 2, 0, 255, BigUint::default(), 1);
        assert_eq!(zki.from_idx.len(), 3);
        assert_eq!(zki.siblings1.len(), 3);
        assert_eq!(zki.siblings1[0].len(), 17);
        assert_eq!(zki.siblings3.len(), 2);
        assert_eq!(zki.im_state_root.len(), 2);
        assert_eq!(zki.im_acc_fee_out[0].len(), 2);
        assert_eq!(zki.im_state_root_fee.len(), 1);
        assert_eq!(zki.fee_idxs.len(), 2);
        assert_eq!(zki.from_bjj_compressed[0].len(), 256);
    }

    #[test]
    fn global_data_length_is_fixed_by_config() {
        let zki = ZkInputs::new(16, 3, 2, 2, 0, 255, BigUint::default(), 1);
        let data = zki.to_hash_global_data();
        // 6 + 6 + 32·3 + 2·78 + 3·(2·2 + 6) + 2·2 + 2 + 4
        assert_eq!(data.len(), 6 + 6 + 96 + 156 + 30 + 4 + 6);

        // Padding-only witness still hashes deterministically.
        assert_eq!(zki.hash_global_data().unwrap(), zki.hash_global_data().unwrap());
    }

    #[test]
    fn serializes_as_decimal_strings() {
        let zki = ZkInputs::new(16, 2, 1, 1, 0, 255, BigUint::from(7u8), 1);
        let json = serde_json::to_value(&zki).unwrap();
        assert_eq!(json["oldStateRoot"], "7");
        assert_eq!(json["oldLastIdx"], "255");
        assert_eq!(json["currentNumBatch"], "1");
        assert!(json["isOld0_1"].is_array());
        assert!(json["tokenID1"].is_array());
        assert!(json.get("meta").is_none());
    }
}
