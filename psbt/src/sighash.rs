// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2023 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2023 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2023 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Signature digests for legacy, segwit v0 (BIP-143) and taproot (BIP-341) inputs.
//!
//! `bc` provides its own sighash engine, but it refuses to work unless the outputs spent by all
//! transaction inputs are known. PSBT signers often know only the prevout of the input they
//! sign, which is enough for legacy and segwit v0 digests, so the engine here keeps prevouts
//! optional and requires all of them only for taproot.

use amplify::ByteArray;
use bc::{
    ConsensusEncode, Sats, Sighash, SighashFlag, SighashType, TapLeafHash, TxOut, Txid, VarInt,
};
use bitcoin_hashes::{sha256, sha256d, Hash, HashEngine};

use crate::script::remove_code_separators;
use crate::UnsignedTx;

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SighashError {
    /// input index {index} is out of range for a transaction with {inputs} inputs.
    InvalidInputIndex { index: usize, inputs: usize },

    /// transaction {txid} input {index} uses SIGHASH_SINGLE, but the total
    /// number of outputs is {outputs} and thus no signature can be produced.
    NoSingleOutputMatch {
        txid: Txid,
        index: usize,
        outputs: usize,
    },

    /// output spent by input #{0} is unknown, while taproot signatures commit to all spent
    /// outputs.
    MissingPrevout(usize),
}

struct SegwitCache {
    hash_prevouts: [u8; 32],
    hash_sequence: [u8; 32],
    hash_outputs: [u8; 32],
}

struct TaprootCache {
    sha_prevouts: [u8; 32],
    sha_amounts: [u8; 32],
    sha_script_pubkeys: [u8; 32],
    sha_sequences: [u8; 32],
    sha_outputs: [u8; 32],
}

/// Computes signature digests for the inputs of a single unsigned transaction, caching the
/// transaction-wide hashes shared by all inputs.
pub struct SighashCache {
    tx: UnsignedTx,
    prevouts: Vec<Option<TxOut>>,
    segwit: Option<SegwitCache>,
    taproot: Option<TaprootCache>,
}

fn put(buf: &mut Vec<u8>, data: &impl ConsensusEncode) { buf.extend(data.consensus_serialize()); }

fn put_script(buf: &mut Vec<u8>, script: &[u8]) {
    put(buf, &VarInt::with(script.len()));
    buf.extend_from_slice(script);
}

fn put_outpoint(buf: &mut Vec<u8>, tx: &UnsignedTx, index: usize) {
    let txin = &tx.inputs[index];
    put(buf, &txin.prev_output.txid);
    put(buf, &txin.prev_output.vout);
}

fn dsha(data: &[u8]) -> [u8; 32] { sha256d::Hash::hash(data).to_byte_array() }

fn sha(data: &[u8]) -> [u8; 32] { sha256::Hash::hash(data).to_byte_array() }

fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = sha(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(&tag_hash);
    engine.input(&tag_hash);
    engine.input(data);
    sha256::Hash::from_engine(engine).to_byte_array()
}

impl SighashCache {
    /// Constructs the cache; `prevouts` lists the outputs spent by each of the inputs, where
    /// known. Taproot digests require all of them to be present.
    pub fn new(tx: UnsignedTx, prevouts: Vec<Option<TxOut>>) -> Self {
        SighashCache {
            tx,
            prevouts,
            segwit: None,
            taproot: None,
        }
    }

    #[inline]
    pub fn tx(&self) -> &UnsignedTx { &self.tx }

    fn check_index(&self, index: usize) -> Result<(), SighashError> {
        if index >= self.tx.inputs.len() {
            return Err(SighashError::InvalidInputIndex {
                index,
                inputs: self.tx.inputs.len(),
            });
        }
        Ok(())
    }

    fn check_single(&self, index: usize, flag: SighashFlag) -> Result<(), SighashError> {
        if flag == SighashFlag::Single && index >= self.tx.outputs.len() {
            return Err(SighashError::NoSingleOutputMatch {
                txid: self.tx.txid(),
                index,
                outputs: self.tx.outputs.len(),
            });
        }
        Ok(())
    }

    /// Digest of the original pre-segwit algorithm. For P2SH inputs `script_code` must be the
    /// redeem script.
    ///
    /// All `OP_CODESEPARATOR`s are removed from the script code, which matches consensus as long
    /// as none of them is executed before the signature check.
    ///
    /// Unlike consensus rules, a `SIGHASH_SINGLE` input without a matching output produces an
    /// error instead of signing the constant `1` hash.
    pub fn legacy_sighash(
        &mut self,
        index: usize,
        script_code: &[u8],
        sighash_type: SighashType,
    ) -> Result<Sighash, SighashError> {
        self.check_index(index)?;
        self.check_single(index, sighash_type.flag)?;

        let script_code = remove_code_separators(script_code);
        let tx = &self.tx;
        let mut buf = Vec::with_capacity(256);
        put(&mut buf, &tx.version);

        let signed_inputs: Vec<usize> =
            if sighash_type.anyone_can_pay { vec![index] } else { (0..tx.inputs.len()).collect() };
        put(&mut buf, &VarInt::with(signed_inputs.len()));
        for no in signed_inputs {
            put_outpoint(&mut buf, tx, no);
            if no == index {
                put_script(&mut buf, &script_code);
            } else {
                put_script(&mut buf, &[]);
            }
            if no != index && sighash_type.flag != SighashFlag::All {
                put(&mut buf, &0u32);
            } else {
                put(&mut buf, &tx.inputs[no].sequence);
            }
        }

        match sighash_type.flag {
            SighashFlag::All => {
                put(&mut buf, &VarInt::with(tx.outputs.len()));
                for txout in &tx.outputs {
                    put(&mut buf, txout);
                }
            }
            SighashFlag::None => put(&mut buf, &VarInt::with(0usize)),
            SighashFlag::Single => {
                put(&mut buf, &VarInt::with(index + 1));
                for _ in 0..index {
                    buf.extend_from_slice(&u64::MAX.to_le_bytes());
                    put_script(&mut buf, &[]);
                }
                put(&mut buf, &tx.outputs[index]);
            }
        }

        put(&mut buf, &tx.lock_time);
        put(&mut buf, &sighash_type.to_consensus_u32());

        let sighash = Sighash::from(dsha(&buf));
        trace!("legacy sighash for input #{index} ({sighash_type}): {sighash}");
        Ok(sighash)
    }

    fn segwit_cache(&mut self) -> &SegwitCache {
        let tx = &self.tx;
        self.segwit.get_or_insert_with(|| {
            let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
            let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
            for (no, txin) in tx.inputs.iter().enumerate() {
                put_outpoint(&mut prevouts, tx, no);
                put(&mut sequences, &txin.sequence);
            }
            let mut outputs = Vec::with_capacity(tx.outputs.len() * 34);
            for txout in &tx.outputs {
                put(&mut outputs, txout);
            }
            SegwitCache {
                hash_prevouts: dsha(&prevouts),
                hash_sequence: dsha(&sequences),
                hash_outputs: dsha(&outputs),
            }
        })
    }

    /// BIP-143 digest for segwit v0 inputs.
    pub fn segwit_sighash(
        &mut self,
        index: usize,
        script_code: &[u8],
        value: Sats,
        sighash_type: SighashType,
    ) -> Result<Sighash, SighashError> {
        self.check_index(index)?;
        self.check_single(index, sighash_type.flag)?;

        let zero = [0u8; 32];
        let (hash_prevouts, hash_sequence, hash_outputs) = {
            let cache = self.segwit_cache();
            let hash_prevouts =
                if sighash_type.anyone_can_pay { zero } else { cache.hash_prevouts };
            let hash_sequence =
                if sighash_type.anyone_can_pay || sighash_type.flag != SighashFlag::All {
                    zero
                } else {
                    cache.hash_sequence
                };
            let hash_outputs = match sighash_type.flag {
                SighashFlag::All => Some(cache.hash_outputs),
                SighashFlag::None => Some(zero),
                SighashFlag::Single => None,
            };
            (hash_prevouts, hash_sequence, hash_outputs)
        };
        let tx = &self.tx;
        let hash_outputs = hash_outputs.unwrap_or_else(|| {
            let mut output = vec![];
            put(&mut output, &tx.outputs[index]);
            dsha(&output)
        });

        let mut buf = Vec::with_capacity(200 + script_code.len());
        put(&mut buf, &tx.version);
        buf.extend_from_slice(&hash_prevouts);
        buf.extend_from_slice(&hash_sequence);
        put_outpoint(&mut buf, tx, index);
        put_script(&mut buf, script_code);
        put(&mut buf, &value);
        put(&mut buf, &tx.inputs[index].sequence);
        buf.extend_from_slice(&hash_outputs);
        put(&mut buf, &tx.lock_time);
        put(&mut buf, &sighash_type.to_consensus_u32());

        let sighash = Sighash::from(dsha(&buf));
        trace!("segwit v0 sighash for input #{index} ({sighash_type}): {sighash}");
        Ok(sighash)
    }

    fn taproot_cache(&mut self) -> Result<&TaprootCache, SighashError> {
        let cache = match self.taproot.take() {
            Some(cache) => cache,
            None => self.compute_taproot_cache()?,
        };
        Ok(self.taproot.insert(cache))
    }

    fn compute_taproot_cache(&self) -> Result<TaprootCache, SighashError> {
        let tx = &self.tx;
        let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
        let mut amounts = Vec::with_capacity(tx.inputs.len() * 8);
        let mut script_pubkeys = Vec::with_capacity(tx.inputs.len() * 35);
        let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
        for (no, txin) in tx.inputs.iter().enumerate() {
            let prevout = self
                .prevouts
                .get(no)
                .and_then(Option::as_ref)
                .ok_or(SighashError::MissingPrevout(no))?;
            put_outpoint(&mut prevouts, tx, no);
            put(&mut amounts, &prevout.value);
            put(&mut script_pubkeys, &prevout.script_pubkey);
            put(&mut sequences, &txin.sequence);
        }
        let mut outputs = Vec::with_capacity(tx.outputs.len() * 34);
        for txout in &tx.outputs {
            put(&mut outputs, txout);
        }
        Ok(TaprootCache {
            sha_prevouts: sha(&prevouts),
            sha_amounts: sha(&amounts),
            sha_script_pubkeys: sha(&script_pubkeys),
            sha_sequences: sha(&sequences),
            sha_outputs: sha(&outputs),
        })
    }

    fn tap_sighash(
        &mut self,
        index: usize,
        leaf_hash: Option<TapLeafHash>,
        sighash_type: Option<SighashType>,
        annex: Option<&[u8]>,
    ) -> Result<Sighash, SighashError> {
        self.check_index(index)?;
        let ty = sighash_type.unwrap_or_default();
        self.check_single(index, ty.flag)?;
        if ty.anyone_can_pay && self.prevouts.get(index).and_then(Option::as_ref).is_none() {
            return Err(SighashError::MissingPrevout(index));
        }

        let mut buf = Vec::with_capacity(256);
        // epoch
        buf.push(0x00);
        buf.push(sighash_type.map(SighashType::into_consensus_u8).unwrap_or(0x00));
        put(&mut buf, &self.tx.version);
        put(&mut buf, &self.tx.lock_time);

        if !ty.anyone_can_pay {
            let cache = self.taproot_cache()?;
            let mut hashes = Vec::with_capacity(32 * 5);
            hashes.extend_from_slice(&cache.sha_prevouts);
            hashes.extend_from_slice(&cache.sha_amounts);
            hashes.extend_from_slice(&cache.sha_script_pubkeys);
            hashes.extend_from_slice(&cache.sha_sequences);
            if ty.flag == SighashFlag::All {
                hashes.extend_from_slice(&cache.sha_outputs);
            }
            buf.extend(hashes);
        } else if ty.flag == SighashFlag::All {
            let cache = self.taproot_outputs_hash();
            buf.extend_from_slice(&cache);
        }

        let ext_flag = if leaf_hash.is_some() { 1u8 } else { 0u8 };
        buf.push(ext_flag * 2 + annex.is_some() as u8);

        let tx = &self.tx;
        if ty.anyone_can_pay {
            let prevout = self
                .prevouts
                .get(index)
                .and_then(Option::as_ref)
                .ok_or(SighashError::MissingPrevout(index))?;
            put_outpoint(&mut buf, tx, index);
            put(&mut buf, &prevout.value);
            put(&mut buf, &prevout.script_pubkey);
            put(&mut buf, &tx.inputs[index].sequence);
        } else {
            put(&mut buf, &(index as u32));
        }

        if let Some(annex) = annex {
            let mut data = Vec::with_capacity(annex.len() + 9);
            put_script(&mut data, annex);
            buf.extend_from_slice(&sha(&data));
        }

        if ty.flag == SighashFlag::Single {
            let mut output = vec![];
            put(&mut output, &tx.outputs[index]);
            buf.extend_from_slice(&sha(&output));
        }

        if let Some(leaf_hash) = leaf_hash {
            buf.extend_from_slice(&leaf_hash.to_byte_array());
            // key version
            buf.push(0x00);
            // no OP_CODESEPARATOR executed
            put(&mut buf, &u32::MAX);
        }

        let sighash = Sighash::from(tagged_hash("TapSighash", &buf));
        trace!("taproot sighash for input #{index}: {sighash}");
        Ok(sighash)
    }

    fn taproot_outputs_hash(&self) -> [u8; 32] {
        if let Some(cache) = &self.taproot {
            return cache.sha_outputs;
        }
        let mut outputs = Vec::with_capacity(self.tx.outputs.len() * 34);
        for txout in &self.tx.outputs {
            put(&mut outputs, txout);
        }
        sha(&outputs)
    }

    /// BIP-341 digest for the taproot key path spending. `None` sighash type stands for
    /// `SIGHASH_DEFAULT`.
    pub fn tap_sighash_key(
        &mut self,
        index: usize,
        sighash_type: Option<SighashType>,
        annex: Option<&[u8]>,
    ) -> Result<Sighash, SighashError> {
        self.tap_sighash(index, None, sighash_type, annex)
    }

    /// BIP-341/342 digest for spending a tapscript leaf with the given leaf hash.
    pub fn tap_sighash_script(
        &mut self,
        index: usize,
        leaf_hash: TapLeafHash,
        sighash_type: Option<SighashType>,
        annex: Option<&[u8]>,
    ) -> Result<Sighash, SighashError> {
        self.tap_sighash(index, Some(leaf_hash), sighash_type, annex)
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use bc::{ConsensusDecode, LockTime, Outpoint, ScriptPubkey, SeqNo, TapScript, Tx, TxVer, Vout};

    use bitcoin_hashes::hash160;

    use super::*;
    use crate::UnsignedTxIn;

    fn tx(inputs: usize, outputs: usize) -> UnsignedTx {
        UnsignedTx {
            version: TxVer::V2,
            inputs: (0..inputs)
                .map(|no| UnsignedTxIn {
                    prev_output: Outpoint::new(
                        Txid::from_byte_array([no as u8 + 1; 32]),
                        Vout::from_u32(no as u32),
                    ),
                    sequence: SeqNo::from_consensus_u32(0xFFFFFFFD),
                })
                .collect(),
            outputs: (0..outputs)
                .map(|no| {
                    TxOut::new(ScriptPubkey::from_unsafe(vec![0x51 + no as u8]), Sats(1000))
                })
                .collect(),
            lock_time: LockTime::ZERO,
        }
    }

    fn prevout() -> TxOut {
        let mut spk = vec![0x51, 0x20];
        spk.extend([0x11; 32]);
        TxOut::new(ScriptPubkey::from_unsafe(spk), Sats(5000))
    }

    fn hex(s: &str) -> Vec<u8> { Vec::<u8>::from_hex(s).unwrap() }

    fn unsigned_tx(s: &str) -> UnsignedTx { UnsignedTx::from(Tx::consensus_deserialize(hex(s)).unwrap()) }

    fn txouts(s: &str) -> Vec<Option<TxOut>> {
        let data = hex(s);
        let mut cursor = std::io::Cursor::new(data);
        let count = VarInt::consensus_decode(&mut cursor).unwrap().to_usize();
        (0..count).map(|_| Some(TxOut::consensus_decode(&mut cursor).unwrap())).collect()
    }

    fn digest(sighash: Sighash) -> Vec<u8> { <[u8; 32]>::from(sighash).to_vec() }

    fn p2pkh_code(pubkey: &str) -> Vec<u8> {
        let hash = hash160::Hash::hash(&hex(pubkey));
        ScriptPubkey::p2pkh(hash.to_byte_array()).to_vec()
    }

    const BIP143_P2WPKH_TX: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";

    #[test]
    fn bip143_p2wpkh() {
        let mut cache = SighashCache::new(unsigned_tx(BIP143_P2WPKH_TX), vec![None, None]);
        let script_code = p2pkh_code("025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee6357");
        let sighash = cache
            .segwit_sighash(1, &script_code, Sats(600_000_000), SighashType::all())
            .unwrap();
        assert_eq!(
            digest(sighash),
            hex("c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670")
        );

        let cache = cache.segwit.as_ref().unwrap();
        assert_eq!(
            cache.hash_prevouts.to_vec(),
            hex("96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37")
        );
        assert_eq!(
            cache.hash_sequence.to_vec(),
            hex("52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b")
        );
        assert_eq!(
            cache.hash_outputs.to_vec(),
            hex("863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5")
        );
    }

    #[test]
    fn bip143_p2sh_p2wpkh() {
        let tx = unsigned_tx(
            "0100000001db6b1b20aa0fd7b23880be2ecbd4a98130974cf4748fb66092ac4d3ceb1a54770100000000feffffff02b8b4eb0b000000001976a914a457b684d7f0d539a46a45bbc043f35b59d0d96388ac0008af2f000000001976a914fd270b1ee6abcaea97fea7ad0402e8bd8ad6d77c88ac92040000",
        );
        let mut cache = SighashCache::new(tx, vec![None]);
        let script_code = p2pkh_code("03ad1d8e89212f0b92c74d23bb710c00662ad1470198ac48c43f7d6f93a2a26873");
        let sighash = cache
            .segwit_sighash(0, &script_code, Sats(1_000_000_000), SighashType::all())
            .unwrap();
        assert_eq!(
            digest(sighash),
            hex("64f3b0f4dd2bb3aa1ce8566d220cc74dda9df97d8490cc81d89d735c92e59fb6")
        );

        let cache = cache.segwit.as_ref().unwrap();
        assert_eq!(
            cache.hash_prevouts.to_vec(),
            hex("b0287b4a252ac05af83d2dcef00ba313af78a3e9c329afa216eb3aa2a7b4613a")
        );
        assert_eq!(
            cache.hash_sequence.to_vec(),
            hex("18606b350cd8bf565266bc352f0caddcf01e8fa789dd8a15386327cf8cabe198")
        );
        assert_eq!(
            cache.hash_outputs.to_vec(),
            hex("de984f44532e2173ca0d64314fcefe6d30da6f8cf27bafa706da61df8a226c83")
        );
    }

    // Serializes the transaction with the script code in the signed input slot and empty
    // scripts elsewhere, followed by the sighash type.
    fn legacy_preimage(tx: &UnsignedTx, index: usize, script_code: &[u8]) -> [u8; 32] {
        let tx = tx.to_tx_with(|no| {
            let sig_script = if no == index { script_code.to_vec() } else { vec![] };
            (bc::SigScript::from_unsafe(sig_script), empty!())
        });
        let mut data = tx.consensus_serialize();
        data.extend(1u32.to_le_bytes());
        dsha(&data)
    }

    #[test]
    fn legacy_all() {
        let tx = unsigned_tx(BIP143_P2WPKH_TX);
        let mut cache = SighashCache::new(tx.clone(), vec![None, None]);
        let p2pk = hex("2103c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432ac");
        let sighash = cache.legacy_sighash(0, &p2pk, SighashType::all()).unwrap();
        assert_eq!(
            digest(sighash),
            hex("63cec688ee06a91e913875356dd4dea2f8e0f2a2659885372da2a37e32c7532e")
        );
        assert_eq!(<[u8; 32]>::from(sighash), legacy_preimage(&tx, 0, &p2pk));

        let script_code = p2pkh_code("025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee6357");
        let sighash = cache.legacy_sighash(1, &script_code, SighashType::all()).unwrap();
        assert_eq!(<[u8; 32]>::from(sighash), legacy_preimage(&tx, 1, &script_code));
    }

    #[test]
    fn legacy_ignores_code_separators() {
        let tx = unsigned_tx(BIP143_P2WPKH_TX);
        let mut cache = SighashCache::new(tx, vec![None, None]);
        let p2pk = hex("2103c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432ac");
        let mut separated = vec![0xab];
        separated.extend(&p2pk);
        separated.insert(separated.len() - 1, 0xab);
        assert_eq!(
            cache.legacy_sighash(0, &separated, SighashType::all()),
            cache.legacy_sighash(0, &p2pk, SighashType::all())
        );
    }

    fn check_taproot(
        tx: &str,
        prevouts: &str,
        index: usize,
        sighash_type: Option<SighashType>,
        annex: Option<&str>,
        leaf_script: Option<&str>,
        expected: &str,
    ) {
        let mut cache = SighashCache::new(unsigned_tx(tx), txouts(prevouts));
        let annex = annex.map(hex);
        let sighash = match leaf_script {
            Some(script) => {
                let leaf_hash = TapScript::from_unsafe(hex(script)).tap_leaf_hash();
                cache.tap_sighash_script(index, leaf_hash, sighash_type, annex.as_deref())
            }
            None => cache.tap_sighash_key(index, sighash_type, annex.as_deref()),
        };
        assert_eq!(digest(sighash.unwrap()), hex(expected));
    }

    #[test]
    fn bip341_key_path() {
        check_taproot(
            "020000000164eb050a5e3da0c2a65e4786f26d753b7bc69691fabccafb11f7acef36641f1846010000003101b2b404392a22000000000017a9147f2bde86fe78bf68a0544a4f290e12f0b7e0a08c87580200000000000017a91425d11723074ecfb96a0a83c3956bfaf362ae0c908758020000000000001600147e20f938993641de67bb0cdd71682aa34c4d29ad5802000000000000160014c64984dc8761acfa99418bd6bedc79b9287d652d72000000",
            "01365724000000000023542156b39dab4f8f3508e0432cfb41fab110170acaa2d4c42539cb90a4dc7c093bc500",
            0,
            None,
            None,
            None,
            "33ca0ebfb4a945eeee9569fc0f5040221275f88690b7f8592ada88ce3bdf6703",
        );
        check_taproot(
            "0200000002fff49be59befe7566050737910f6ccdc5e749c7f8860ddc140386463d88c5ad0f3000000002cf68eb4a3d67f9d4c079249f7e4f27b8854815cb1ed13842d4fbf395f9e217fd605ee24090100000065235d9203f458520000000000160014b6d48333bb13b4c644e57c43a9a26df3a44b785e58020000000000001976a914eea9461a9e1e3f765d3af3e726162e0229fe3eb688ac58020000000000001976a9143a8869c9f2b5ea1d4ff3aeeb6a8fb2fffb1ad5fe88ac0ad7125c",
            "02591f220000000000225120f25ad35583ea31998d968871d7de1abd2a52f6fe4178b54ea158274806ff4ece48fb310000000000225120f25ad35583ea31998d968871d7de1abd2a52f6fe4178b54ea158274806ff4ece",
            1,
            Some(SighashType::all()),
            None,
            None,
            "626ab955d58c9a8a600a0c580549d06dc7da4e802eb2a531f62a588e430967a8",
        );
        check_taproot(
            "0200000001350005f65aa830ced2079df348e2d8c2bdb4f10e2dde6a161d8a07b40d1ad87dae000000001611d0d603d9dc0e000000000017a914459b6d7d6bbb4d8837b4bf7e9a4556f952da2f5c8758020000000000001976a9141dd70e1299ffc2d5b51f6f87de9dfe9398c33cbb88ac58020000000000001976a9141dd70e1299ffc2d5b51f6f87de9dfe9398c33cbb88aca71c1f4f",
            "01c4811000000000002251201bf9297d0a2968ae6693aadd0fa514717afefd218087a239afb7418e2d22e65c",
            0,
            Some(SighashType::all_anyone_can_pay()),
            None,
            None,
            "dfa9437f9c9a1d1f9af271f79f2f5482f287cdb0d2e03fa92c8a9b216cc6061c",
        );
        check_taproot(
            "020000000185bed1a6da2bffbd60ec681a1bfb71c5111d6395b99b3f8b2bf90167111bcb18f5010000007c83ace802ded24a00000000001600142c4698f9f7a773866879755aa78c516fb332af8e5802000000000000160014d38639dfbac4259323b98a472405db0c461b31fa61073747",
            "0144c84d0000000000225120e3f2107989c88e67296ab2faca930efa2e3a5bd3ff0904835a11c9e807458621",
            0,
            Some(SighashType::none()),
            None,
            None,
            "3129de36a5d05fff97ffca31eb75fcccbbbc27b3147a7a36a9e4b45d8b625067",
        );
        check_taproot(
            "02000000017836b409a5fed32211407e44b971591f2032053f14701fb5b3a30c0ff382f2cc9c0100000061ac55f60288fb5600000000001976a9144ea02f6f182b082fb6ce47e36bbde390b6a41b5088ac58020000000000001976a9144ea02f6f182b082fb6ce47e36bbde390b6a41b5088ace4000000",
            "01efa558000000000022512007071ea3dc7e331b0687d0193d1e6d6ed10e645ef36f10ef8831d5e522ac9e80",
            0,
            Some(SighashType::single()),
            None,
            None,
            "30239345177cadd0e3ea413d49803580abb6cb27971b481b7788a78d35117a88",
        );
        check_taproot(
            "0100000001aa6deae89d5e0aaca58714fc76ef6f3c8284224888089232d4e663843ed3ab3eae010000008b6657a60450cb4c0000000000160014a3d42b5413ef0c0701c4702f3cd7d4df222c147058020000000000001976a91430b4ed8723a4ee8992aa2c8814cfe5c3ad0ab9d988ac5802000000000000160014365b1166a6ed0a5e8e9dff17a6d00bbb43454bc758020000000000001976a914bc98c51a84fe7fad5dc380eb8b39586eff47241688ac4f313247",
            "0107af4e00000000002251202c36d243dfc06cb56a248e62df27ecba7417307511a81ae61aa41c597a929c69",
            0,
            Some(SighashType::single_anyone_can_pay()),
            None,
            None,
            "bf9c83f26c6dd16449e4921f813f551c4218e86f2ec906ca8611175b41b566df",
        );
    }

    #[test]
    fn bip341_annex() {
        check_taproot(
            "0200000001df8123752e8f37d132c4e9f1ff7e4f9b986ade9211267e9ebd5fd22a5e718dec6d01000000ce4023b903cb7b23000000000017a914a18b36ea7a094db2f4940fc09edf154e86de7bd787580200000000000017a914afd0d512a2c5c2b40e25669e9cc460303c325b8b87580200000000000017a914a18b36ea7a094db2f4940fc09edf154e86de7bd787f6020000",
            "01ea49260000000000225120ab5e9800806bf18cb246edcf5fe63441208fe955a4b5a35bbff65f5db622a010",
            0,
            Some(SighashType::single_anyone_can_pay()),
            Some("507b979802e62d397acb29f56743a791894b99372872fc5af06a4f6e8d242d0615cda53062bb20e6ec79756fe39183f0c128adfe85559a8fa042b042c018aa8010143799e44f0893c40e1e"),
            None,
            "3b003000add359a364a156e73e02846782a59d0d95ca8c4638aaad99f2ef915c",
        );
    }

    #[test]
    fn bip341_script_path() {
        check_taproot(
            "020000000189fc651483f9296b906455dd939813bf086b1bbe7c77635e157c8e14ae29062195010000004445b5c7044561320000000000160014331414dbdada7fb578f700f38fb69995fc9b5ab958020000000000001976a914268db0a8104cc6d8afd91233cc8b3d1ace8ac3ef88ac580200000000000017a914ec00dcb368d6a693e11986d265f659d2f59e8be2875802000000000000160014c715799a49a0bae3956df9c17cb4440a673ac0df6f010000",
            "011bec34000000000022512028055142ea437db73382e991861446040b61dd2185c4891d7daf6893d79f7182",
            0,
            Some(SighashType::all()),
            None,
            Some("20cc4e1107aea1d170c5ff5b6817e1303010049724fb3caa7941792ea9d29b3e2bacab"),
            "d66de5274a60400c7b08c86ba6b7f198f40660079edf53aca89d2a9501317f2e",
        );
    }

    #[test]
    fn single_without_output() {
        let mut cache = SighashCache::new(tx(2, 1), vec![Some(prevout()), Some(prevout())]);
        assert!(matches!(
            cache.legacy_sighash(1, &[0x51], SighashType::single()),
            Err(SighashError::NoSingleOutputMatch { index: 1, outputs: 1, .. })
        ));
        assert!(matches!(
            cache.segwit_sighash(1, &[0x51], Sats(1), SighashType::single()),
            Err(SighashError::NoSingleOutputMatch { .. })
        ));
        assert!(cache.legacy_sighash(0, &[0x51], SighashType::single()).is_ok());
    }

    #[test]
    fn index_out_of_range() {
        let mut cache = SighashCache::new(tx(1, 1), vec![None]);
        assert_eq!(
            cache.legacy_sighash(3, &[], SighashType::all()),
            Err(SighashError::InvalidInputIndex {
                index: 3,
                inputs: 1
            })
        );
    }

    #[test]
    fn taproot_requires_all_prevouts() {
        let mut cache = SighashCache::new(tx(2, 1), vec![Some(prevout()), None]);
        assert_eq!(cache.tap_sighash_key(0, None, None), Err(SighashError::MissingPrevout(1)));
        // ANYONECANPAY commits to the own prevout only
        let acp = Some(SighashType::all_anyone_can_pay());
        assert!(cache.tap_sighash_key(0, acp, None).is_ok());
    }
}
