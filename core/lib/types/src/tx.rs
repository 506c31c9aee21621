//! L1 and L2 transaction types and their wire encodings.
//!
//! The byte and bit layouts here are consensus-critical: they must agree
//! with the on-chain contract (L1 wire records, data-availability bytes)
//! and with the proving circuit (compressed tx data, signed message).

use std::fmt;

use ethereum_types::Address;
use num_bigint::BigUint;
use num_traits::Zero;
use rollup_crypto::{poseidon, CryptoError, Fr};
use serde::{Deserialize, Serialize};

use crate::{
    account::BjjPubKey, fee::FeeSelector, float40::Float40, serde_wrappers, BatchNum, ChainId,
    CodecError, Idx, Nonce, TokenId,
};

/// Constant folded into every signed L2 message, binding signatures to this
/// protocol.
pub const SIGNATURE_CONSTANT: u32 = 0xC60B_E60F;

/// On-chain byte length of one L1 transaction record.
pub const L1_TX_WIRE_LEN: usize = 78;

/// Transaction kinds. The first six originate on L1, the rest are L2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    CreateAccountDeposit,
    CreateAccountDepositTransfer,
    Deposit,
    DepositTransfer,
    ForceTransfer,
    ForceExit,
    Transfer,
    TransferToEthAddr,
    TransferToBjj,
    Exit,
}

impl TxType {
    /// Derives the L1 tx type from its wire fields, the way the contract
    /// constrains them.
    pub fn for_l1(from_idx: Idx, to_idx: Idx, deposit_amount: &BigUint) -> TxType {
        if from_idx == Idx::NULL {
            if to_idx == Idx::NULL {
                TxType::CreateAccountDeposit
            } else {
                TxType::CreateAccountDepositTransfer
            }
        } else if to_idx == Idx::NULL {
            TxType::Deposit
        } else if to_idx == Idx::EXIT {
            TxType::ForceExit
        } else if deposit_amount.is_zero() {
            TxType::ForceTransfer
        } else {
            TxType::DepositTransfer
        }
    }

    /// Derives the L2 tx type from the pool tx destination fields.
    pub fn for_l2(to_idx: Idx, to_bjj: &BjjPubKey) -> TxType {
        if to_idx == Idx::EXIT {
            TxType::Exit
        } else if to_idx != Idx::NULL {
            TxType::Transfer
        } else if to_bjj.is_empty() {
            TxType::TransferToEthAddr
        } else {
            TxType::TransferToBjj
        }
    }

    pub fn is_l1(&self) -> bool {
        matches!(
            self,
            TxType::CreateAccountDeposit
                | TxType::CreateAccountDepositTransfer
                | TxType::Deposit
                | TxType::DepositTransfer
                | TxType::ForceTransfer
                | TxType::ForceExit
        )
    }
}

/// Globally unique transaction identifier: a tag byte (`0x00` L1 user,
/// `0x01` L1 coordinator, `0x02` L2) followed by 31 bytes of a Poseidon
/// digest of the identifying content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(#[serde(with = "serde_wrappers::hex_bytes32")] pub [u8; 32]);

impl TxId {
    pub const PREFIX_L1_USER: u8 = 0x00;
    pub const PREFIX_L1_COORD: u8 = 0x01;
    pub const PREFIX_L2: u8 = 0x02;

    fn derive(prefix: u8, content: &[u8]) -> Result<TxId, CryptoError> {
        let digest = poseidon::hash_bytes(content)?;
        let le = rollup_crypto::fr_to_biguint(&digest).to_bytes_le();
        let mut out = [0u8; 32];
        out[0] = prefix;
        let take = le.len().min(31);
        out[1..1 + take].copy_from_slice(&le[..take]);
        Ok(TxId(out))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId(0x{})", hex::encode(self.0))
    }
}

/// An EdDSA signature in its 64-byte compressed form.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EddsaSignature(#[serde(with = "serde_wrappers::hex_bytes64")] pub [u8; 64]);

impl EddsaSignature {
    pub const EMPTY: EddsaSignature = EddsaSignature([0u8; 64]);
}

impl Default for EddsaSignature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for EddsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EddsaSignature(0x{})", hex::encode(self.0))
    }
}

fn write_idx(out: &mut [u8], idx: Idx) -> Result<(), CodecError> {
    if idx > Idx::MAX {
        return Err(CodecError::IdxOverflow);
    }
    out.copy_from_slice(&idx.to_be_bytes()[2..]);
    Ok(())
}

fn read_idx(bytes: &[u8]) -> Idx {
    let mut be = [0u8; 8];
    be[2..].copy_from_slice(bytes);
    Idx(u64::from_be_bytes(be))
}

/// A transaction originated on the base chain, either by a user (queued) or
/// injected by the forging coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L1Tx {
    pub from_idx: Idx,
    pub to_idx: Idx,
    pub token_id: TokenId,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub amount: BigUint,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub deposit_amount: BigUint,
    pub from_bjj: BjjPubKey,
    pub from_eth_addr: Address,
    pub tx_type: TxType,
    /// Position inside the forge queue (user txs) or the coordinator list.
    pub position: usize,
    /// Number of the queue this tx belongs to; `None` for coordinator txs
    /// until they are attached to a batch.
    pub to_forge_l1_txs_num: Option<u64>,
    pub user_origin: bool,
    pub batch_num: Option<BatchNum>,
    pub eth_block_num: u64,
}

impl L1Tx {
    /// The 78-byte on-chain record:
    /// `from_eth_addr(20) || from_bjj(32, byte-reversed) || from_idx(6) ||
    /// deposit_amount(5, Float40) || amount(5, Float40) || token_id(4) ||
    /// to_idx(6)`.
    pub fn to_wire_bytes(&self) -> Result<[u8; L1_TX_WIRE_LEN], CodecError> {
        let mut out = [0u8; L1_TX_WIRE_LEN];
        out[0..20].copy_from_slice(self.from_eth_addr.as_bytes());
        let mut bjj = self.from_bjj.0;
        bjj.reverse();
        out[20..52].copy_from_slice(&bjj);
        write_idx(&mut out[52..58], self.from_idx)?;
        out[58..63].copy_from_slice(&Float40::encode(&self.deposit_amount)?.to_bytes());
        out[63..68].copy_from_slice(&Float40::encode(&self.amount)?.to_bytes());
        out[68..72].copy_from_slice(&self.token_id.to_be_bytes());
        write_idx(&mut out[72..78], self.to_idx)?;
        Ok(out)
    }

    /// Decodes one on-chain record; metadata fields (`position`,
    /// `to_forge_l1_txs_num`, …) are left for the caller.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != L1_TX_WIRE_LEN {
            return Err(CodecError::Truncated {
                expected: L1_TX_WIRE_LEN,
                got: bytes.len(),
            });
        }
        let mut bjj: [u8; 32] = bytes[20..52].try_into().unwrap();
        bjj.reverse();
        let from_idx = read_idx(&bytes[52..58]);
        let to_idx = read_idx(&bytes[72..78]);
        let deposit_amount =
            Float40::from_bytes(bytes[58..63].try_into().unwrap()).decode()?;
        let amount = Float40::from_bytes(bytes[63..68].try_into().unwrap()).decode()?;
        Ok(L1Tx {
            from_idx,
            to_idx,
            token_id: TokenId(u32::from_be_bytes(bytes[68..72].try_into().unwrap())),
            tx_type: TxType::for_l1(from_idx, to_idx, &deposit_amount),
            amount,
            deposit_amount,
            from_bjj: BjjPubKey(bjj),
            from_eth_addr: Address::from_slice(&bytes[0..20]),
            position: 0,
            to_forge_l1_txs_num: None,
            user_origin: true,
            batch_num: None,
            eth_block_num: 0,
        })
    }

    pub fn tx_id(&self) -> Result<TxId, CryptoError> {
        let mut content = [0u8; 10];
        if self.user_origin {
            content[0..8]
                .copy_from_slice(&self.to_forge_l1_txs_num.unwrap_or_default().to_be_bytes());
            content[8..10].copy_from_slice(&(self.position as u16).to_be_bytes());
            TxId::derive(TxId::PREFIX_L1_USER, &content)
        } else {
            let batch = self.batch_num.map(|b| *b).unwrap_or_default();
            content[0..8].copy_from_slice(&batch.to_be_bytes());
            content[8..10].copy_from_slice(&(self.position as u16).to_be_bytes());
            TxId::derive(TxId::PREFIX_L1_COORD, &content)
        }
    }
}

/// An off-chain transfer as submitted to (and selected from) the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolL2Tx {
    pub from_idx: Idx,
    /// `Idx::NULL` means the destination is named by `to_eth_addr` /
    /// `to_bjj` and must be resolved against the state.
    pub to_idx: Idx,
    pub to_eth_addr: Address,
    pub to_bjj: BjjPubKey,
    pub token_id: TokenId,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub amount: BigUint,
    pub fee: FeeSelector,
    pub nonce: Nonce,
    /// Last batch number this tx may be forged in; 0 disables the bound.
    pub max_num_batch: u64,
    pub signature: EddsaSignature,
    /// Linked-tx request fields (atomic groups); all-zero when unused.
    pub rq_offset: u8,
    pub rq_from_idx: Idx,
    pub rq_to_idx: Idx,
    pub rq_to_eth_addr: Address,
    pub rq_to_bjj: BjjPubKey,
    pub rq_token_id: TokenId,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub rq_amount: BigUint,
    pub rq_fee: FeeSelector,
    pub rq_nonce: Nonce,
    pub tx_type: TxType,
}

impl PoolL2Tx {
    /// The compressed tx data bound into the signature (low bit first):
    /// `sig_constant(32) | chain_id(16) | from_idx(48) | to_idx(48) |
    /// token_id(32) | nonce(40) | fee(8) | to_bjj_sign(1)`.
    pub fn tx_compressed_data(&self, chain_id: ChainId) -> Result<BigUint, CodecError> {
        if self.to_idx > Idx::MAX || self.from_idx > Idx::MAX {
            return Err(CodecError::IdxOverflow);
        }
        if self.nonce > Nonce::MAX {
            return Err(CodecError::NonceOverflow);
        }
        let mut data = BigUint::from(SIGNATURE_CONSTANT);
        data |= BigUint::from(chain_id) << 32;
        data |= BigUint::from(*self.from_idx) << 48;
        data |= BigUint::from(*self.to_idx) << 96;
        data |= BigUint::from(*self.token_id) << 144;
        data |= BigUint::from(*self.nonce) << 176;
        data |= BigUint::from(self.fee.0) << 216;
        if self.to_bjj.sign_ay().0 {
            data |= BigUint::from(1u8) << 224;
        }
        Ok(data)
    }

    /// The v2 compressed form used for request-field linking and in the
    /// witness: `from_idx(48) | to_idx(48) | amount(40, Float40) |
    /// token_id(32) | nonce(40) | fee(8) | to_bjj_sign(1)`.
    pub fn tx_compressed_data_v2(&self) -> Result<BigUint, CodecError> {
        Self::compressed_v2(
            self.from_idx,
            self.to_idx,
            &self.amount,
            self.token_id,
            self.nonce,
            self.fee,
            self.to_bjj.sign_ay().0,
        )
    }

    /// `tx_compressed_data_v2` over the request fields; zero when the tx
    /// links to nothing.
    pub fn rq_tx_compressed_data_v2(&self) -> Result<BigUint, CodecError> {
        if self.rq_from_idx == Idx::NULL
            && self.rq_to_idx == Idx::NULL
            && self.rq_amount.is_zero()
            && self.rq_to_eth_addr.is_zero()
            && self.rq_to_bjj.is_empty()
        {
            return Ok(BigUint::default());
        }
        Self::compressed_v2(
            self.rq_from_idx,
            self.rq_to_idx,
            &self.rq_amount,
            self.rq_token_id,
            self.rq_nonce,
            self.rq_fee,
            self.rq_to_bjj.sign_ay().0,
        )
    }

    fn compressed_v2(
        from_idx: Idx,
        to_idx: Idx,
        amount: &BigUint,
        token_id: TokenId,
        nonce: Nonce,
        fee: FeeSelector,
        to_bjj_sign: bool,
    ) -> Result<BigUint, CodecError> {
        if to_idx > Idx::MAX || from_idx > Idx::MAX {
            return Err(CodecError::IdxOverflow);
        }
        if nonce > Nonce::MAX {
            return Err(CodecError::NonceOverflow);
        }
        let mut data = BigUint::from(*from_idx);
        data |= BigUint::from(*to_idx) << 48;
        data |= BigUint::from(Float40::encode(amount)?.as_u64()) << 96;
        data |= BigUint::from(*token_id) << 136;
        data |= BigUint::from(*nonce) << 168;
        data |= BigUint::from(fee.0) << 208;
        if to_bjj_sign {
            data |= BigUint::from(1u8) << 216;
        }
        Ok(data)
    }

    /// The Poseidon-hashed message the sender signs:
    /// `Poseidon([tx_compressed_data, amountF40 ∥ to_eth_addr, to_bjj_ay,
    /// rq_tx_compressed_data_v2, rq_to_eth_addr, rq_to_bjj_ay])`.
    pub fn hash_to_sign(&self, chain_id: ChainId) -> Result<BigUint, CodecError> {
        let compressed = self.tx_compressed_data(chain_id)?;
        let mut e1 = [0u8; 25];
        e1[0..5].copy_from_slice(&Float40::encode(&self.amount)?.to_bytes());
        e1[5..25].copy_from_slice(self.to_eth_addr.as_bytes());
        let elements = [
            field(&compressed),
            field(&BigUint::from_bytes_be(&e1)),
            field(&self.to_bjj.sign_ay().1),
            field(&self.rq_tx_compressed_data_v2()?),
            field(&BigUint::from_bytes_be(self.rq_to_eth_addr.as_bytes())),
            field(&self.rq_to_bjj.sign_ay().1),
        ];
        let digest = poseidon::hash(&elements).expect("arity-6 Poseidon");
        Ok(rollup_crypto::fr_to_biguint(&digest))
    }

    pub fn tx_id(&self) -> Result<TxId, CodecError> {
        let mut content = [0u8; 21];
        content[0..6].copy_from_slice(&self.from_idx.to_be_bytes()[2..]);
        content[6..10].copy_from_slice(&self.token_id.to_be_bytes());
        content[10..15].copy_from_slice(&Float40::encode(&self.amount)?.to_bytes());
        content[15..20].copy_from_slice(&self.nonce.to_be_bytes()[3..]);
        content[20] = self.fee.0;
        Ok(TxId::derive(TxId::PREFIX_L2, &content).expect("digest of 21 bytes"))
    }
}

fn field(value: &BigUint) -> Fr {
    // Packed values fit the field; `ay` coordinates of untrusted keys may
    // not and are reduced, matching the circuit's field semantics.
    rollup_crypto::fr_from_biguint_reduced(value)
}

/// A forged off-chain transfer, as reconstructed from call data and stored
/// in batch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Tx {
    pub from_idx: Idx,
    pub to_idx: Idx,
    pub token_id: TokenId,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub amount: BigUint,
    pub fee: FeeSelector,
    pub nonce: Nonce,
    pub tx_type: TxType,
    pub batch_num: Option<BatchNum>,
    pub eth_block_num: u64,
    pub position: usize,
}

impl L2Tx {
    /// Lifts call-data L2 txs back into pool form for reprocessing; the
    /// signature was verified on-chain and is not recoverable.
    pub fn into_pool_tx(self) -> PoolL2Tx {
        PoolL2Tx {
            tx_type: TxType::for_l2(self.to_idx, &BjjPubKey::EMPTY),
            from_idx: self.from_idx,
            to_idx: self.to_idx,
            to_eth_addr: Address::zero(),
            to_bjj: BjjPubKey::EMPTY,
            token_id: self.token_id,
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            max_num_batch: 0,
            signature: EddsaSignature::EMPTY,
            rq_offset: 0,
            rq_from_idx: Idx::NULL,
            rq_to_idx: Idx::NULL,
            rq_to_eth_addr: Address::zero(),
            rq_to_bjj: BjjPubKey::EMPTY,
            rq_token_id: TokenId(0),
            rq_amount: BigUint::default(),
            rq_fee: FeeSelector::NONE,
            rq_nonce: Nonce(0),
        }
    }

    /// The data-availability record published per tx slot:
    /// `from_idx || to_idx || amount(5, Float40) || fee(1)`, idx width
    /// `n_levels / 8` bytes.
    pub fn to_data_availability_bytes(&self, n_levels: u32) -> Result<Vec<u8>, CodecError> {
        data_availability_bytes(self.from_idx, self.to_idx, &self.amount, self.fee.0, n_levels)
    }
}

pub fn data_availability_bytes(
    from_idx: Idx,
    to_idx: Idx,
    amount: &BigUint,
    fee: u8,
    n_levels: u32,
) -> Result<Vec<u8>, CodecError> {
    let idx_len = (n_levels / 8) as usize;
    let mut out = Vec::with_capacity(idx_len * 2 + 6);
    let from = from_idx.to_be_bytes();
    let to = to_idx.to_be_bytes();
    out.extend_from_slice(&from[8 - idx_len..]);
    out.extend_from_slice(&to[8 - idx_len..]);
    out.extend_from_slice(&Float40::encode(amount)?.to_bytes());
    out.push(fee);
    Ok(out)
}

/// A pending (or processed) exit: the leaf committed into a batch's exit
/// tree, with its membership proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub account_idx: Idx,
    pub batch_num: BatchNum,
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub balance: BigUint,
    pub merkle_proof: ExitProof,
    pub instant_withdrawn: Option<u64>,
    pub delayed_withdraw_request: Option<u64>,
}

/// Membership proof of an exit leaf against the batch's exit root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitProof {
    #[serde(with = "serde_wrappers::biguint_dec")]
    pub root: BigUint,
    #[serde(with = "serde_wrappers::biguint_dec_vec")]
    pub siblings: Vec<BigUint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_l1_tx() -> L1Tx {
        L1Tx {
            from_idx: Idx::NULL,
            to_idx: Idx::NULL,
            token_id: TokenId(1),
            amount: BigUint::default(),
            deposit_amount: BigUint::from(16_000_000u64),
            from_bjj: BjjPubKey([0x21; 32]),
            from_eth_addr: Address::repeat_byte(0x7e),
            tx_type: TxType::CreateAccountDeposit,
            position: 0,
            to_forge_l1_txs_num: Some(1),
            user_origin: true,
            batch_num: None,
            eth_block_num: 10,
        }
    }

    #[test]
    fn l1_wire_round_trip() {
        let tx = sample_l1_tx();
        let bytes = tx.to_wire_bytes().unwrap();
        assert_eq!(bytes.len(), L1_TX_WIRE_LEN);
        let decoded = L1Tx::from_wire_bytes(&bytes).unwrap();
        assert_eq!(decoded.from_eth_addr, tx.from_eth_addr);
        assert_eq!(decoded.from_bjj, tx.from_bjj);
        assert_eq!(decoded.deposit_amount, tx.deposit_amount);
        assert_eq!(decoded.amount, tx.amount);
        assert_eq!(decoded.token_id, tx.token_id);
        assert_eq!(decoded.tx_type, TxType::CreateAccountDeposit);
    }

    #[test]
    fn l1_wire_layout_is_fixed() {
        let tx = sample_l1_tx();
        let bytes = tx.to_wire_bytes().unwrap();
        assert_eq!(&bytes[0..20], Address::repeat_byte(0x7e).as_bytes());
        // BJJ is byte-reversed on the wire.
        assert_eq!(&bytes[20..52], &[0x21; 32]);
        assert_eq!(&bytes[52..58], &[0u8; 6]);
        // deposit_amount = 16_000_000, exponent 0.
        assert_eq!(&bytes[58..63], &[0, 0, 0xf4, 0x24, 0x00]);
        assert_eq!(&bytes[68..72], &[0, 0, 0, 1]);
    }

    #[test]
    fn l1_type_derivation() {
        let zero = BigUint::default();
        let some = BigUint::from(5u8);
        assert_eq!(
            TxType::for_l1(Idx::NULL, Idx::NULL, &some),
            TxType::CreateAccountDeposit
        );
        assert_eq!(
            TxType::for_l1(Idx::NULL, Idx(258), &some),
            TxType::CreateAccountDepositTransfer
        );
        assert_eq!(TxType::for_l1(Idx(256), Idx::NULL, &some), TxType::Deposit);
        assert_eq!(TxType::for_l1(Idx(256), Idx::EXIT, &zero), TxType::ForceExit);
        assert_eq!(
            TxType::for_l1(Idx(256), Idx(257), &zero),
            TxType::ForceTransfer
        );
        assert_eq!(
            TxType::for_l1(Idx(256), Idx(257), &some),
            TxType::DepositTransfer
        );
    }

    fn sample_pool_tx() -> PoolL2Tx {
        PoolL2Tx {
            from_idx: Idx(256),
            to_idx: Idx(257),
            to_eth_addr: Address::zero(),
            to_bjj: BjjPubKey::EMPTY,
            token_id: TokenId(1),
            amount: BigUint::from(1000u64),
            fee: FeeSelector(126),
            nonce: Nonce(3),
            max_num_batch: 0,
            signature: EddsaSignature::EMPTY,
            rq_offset: 0,
            rq_from_idx: Idx::NULL,
            rq_to_idx: Idx::NULL,
            rq_to_eth_addr: Address::zero(),
            rq_to_bjj: BjjPubKey::EMPTY,
            rq_token_id: TokenId(0),
            rq_amount: BigUint::default(),
            rq_fee: FeeSelector::NONE,
            rq_nonce: Nonce(0),
            tx_type: TxType::Transfer,
        }
    }

    #[test]
    fn compressed_data_field_packing() {
        let tx = sample_pool_tx();
        let data = tx.tx_compressed_data(5).unwrap();
        let mask = |bits: u32| (BigUint::from(1u8) << bits) - 1u8;
        assert_eq!(&data & mask(32), BigUint::from(SIGNATURE_CONSTANT));
        assert_eq!((&data >> 32u32) & mask(16), BigUint::from(5u8));
        assert_eq!((&data >> 48u32) & mask(48), BigUint::from(256u64));
        assert_eq!((&data >> 96u32) & mask(48), BigUint::from(257u64));
        assert_eq!((&data >> 144u32) & mask(32), BigUint::from(1u8));
        assert_eq!((&data >> 176u32) & mask(40), BigUint::from(3u8));
        assert_eq!((&data >> 216u32) & mask(8), BigUint::from(126u8));
        assert_eq!(&data >> 224u32, BigUint::default());
    }

    #[test]
    fn compressed_data_v2_field_packing() {
        let tx = sample_pool_tx();
        let data = tx.tx_compressed_data_v2().unwrap();
        let mask = |bits: u32| (BigUint::from(1u8) << bits) - 1u8;
        assert_eq!(&data & mask(48), BigUint::from(256u64));
        assert_eq!((&data >> 48u32) & mask(48), BigUint::from(257u64));
        assert_eq!((&data >> 96u32) & mask(40), BigUint::from(1000u64));
        assert_eq!((&data >> 136u32) & mask(32), BigUint::from(1u8));
        assert_eq!((&data >> 168u32) & mask(40), BigUint::from(3u8));
        assert_eq!((&data >> 208u32) & mask(8), BigUint::from(126u8));
    }

    #[test]
    fn hash_to_sign_binds_chain_id_and_amount() {
        let tx = sample_pool_tx();
        let h1 = tx.hash_to_sign(1).unwrap();
        let h2 = tx.hash_to_sign(2).unwrap();
        assert_ne!(h1, h2);

        let mut other = tx.clone();
        other.amount = BigUint::from(2000u64);
        assert_ne!(other.hash_to_sign(1).unwrap(), h1);
    }

    #[test]
    fn tx_ids_are_distinct_per_origin() {
        let l1 = sample_l1_tx();
        let user_id = l1.tx_id().unwrap();
        assert_eq!(user_id.0[0], TxId::PREFIX_L1_USER);

        let mut coord = l1;
        coord.user_origin = false;
        coord.batch_num = Some(BatchNum(1));
        let coord_id = coord.tx_id().unwrap();
        assert_eq!(coord_id.0[0], TxId::PREFIX_L1_COORD);
        assert_ne!(user_id, coord_id);

        let l2_id = sample_pool_tx().tx_id().unwrap();
        assert_eq!(l2_id.0[0], TxId::PREFIX_L2);
    }

    #[test]
    fn data_availability_width_follows_levels() {
        let tx = sample_pool_tx();
        let l2 = L2Tx {
            from_idx: tx.from_idx,
            to_idx: tx.to_idx,
            token_id: tx.token_id,
            amount: tx.amount.clone(),
            fee: tx.fee,
            nonce: tx.nonce,
            tx_type: TxType::Transfer,
            batch_num: None,
            eth_block_num: 0,
            position: 0,
        };
        assert_eq!(l2.to_data_availability_bytes(32).unwrap().len(), 4 + 4 + 6);
        assert_eq!(l2.to_data_availability_bytes(16).unwrap().len(), 2 + 2 + 6);
    }
}
