// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2024 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2024 Dr Maxim Orlovsky. All rights reserved.
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

#![allow(dead_code)]

use bc::secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use bc::{
    CompressedPk, LockTime, Sats, ScriptPubkey, SeqNo, Tx, TxOut, TxVer, Txid, Vout, XOnlyPk,
};
use psbt::{
    pubkey_hash, script_hash, wscript_hash, Psbt, Rejected, SigData, SignRequest, UnsignedTx,
    UnsignedTxIn,
};

pub const PREV_VALUE: u64 = 100_000;

pub struct TestKey {
    pub sk: SecretKey,
    pub pk: PublicKey,
}

impl TestKey {
    pub fn new(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk);
        TestKey { sk, pk }
    }

    pub fn compressed(&self) -> CompressedPk {
        CompressedPk::from_bytes(&self.pk.serialize()[..]).unwrap()
    }

    pub fn keypair(&self) -> Keypair { Keypair::from_secret_key(&Secp256k1::new(), &self.sk) }

    pub fn x_only(&self) -> XOnlyPublicKey { self.keypair().x_only_public_key().0 }

    pub fn xonly_pk(&self) -> XOnlyPk { XOnlyPk::from(self.x_only()) }

    /// Callback producing an ECDSA signature over the requested digest.
    pub fn ecdsa(&self) -> impl FnOnce(&SignRequest) -> Result<SigData, Rejected> {
        let sk = self.sk;
        move |req| {
            let secp = Secp256k1::signing_only();
            Ok(SigData::Ecdsa(secp.sign_ecdsa(&Message::from(req.sighash), &sk)))
        }
    }

    /// Callback producing a BIP-340 signature over the requested digest.
    pub fn schnorr(&self) -> impl FnOnce(&SignRequest) -> Result<SigData, Rejected> {
        let keypair = self.keypair();
        move |req| {
            let secp = Secp256k1::signing_only();
            let msg: [u8; 32] = req.sighash.into();
            let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
            Ok(SigData::Bip340(sig))
        }
    }
}

pub fn p2wpkh(pk: &CompressedPk) -> Vec<u8> { ScriptPubkey::p2wpkh(pubkey_hash(pk)).to_vec() }

pub fn p2pkh(pk: &CompressedPk) -> Vec<u8> { ScriptPubkey::p2pkh(pubkey_hash(pk)).to_vec() }

pub fn p2sh(redeem_script: &[u8]) -> Vec<u8> {
    ScriptPubkey::p2sh(script_hash(redeem_script)).to_vec()
}

pub fn p2wsh(witness_script: &[u8]) -> Vec<u8> {
    ScriptPubkey::p2wsh(wscript_hash(witness_script)).to_vec()
}

pub fn p2tr(output_key: &XOnlyPublicKey) -> Vec<u8> {
    let mut spk = vec![0x51, 0x20];
    spk.extend(output_key.serialize());
    spk
}

/// Bare `threshold`-of-n multisig script over the given keys.
pub fn multisig(threshold: u8, keys: &[&TestKey]) -> Vec<u8> {
    let mut script = vec![0x50 + threshold];
    for key in keys {
        script.push(0x21);
        script.extend(key.pk.serialize());
    }
    script.push(0x50 + keys.len() as u8);
    script.push(0xae);
    script
}

/// Transaction funding all the given scripts, one output per script.
pub fn funding_tx(scripts: &[Vec<u8>]) -> Tx {
    UnsignedTx {
        version: TxVer::V2,
        inputs: vec![UnsignedTxIn {
            prev_output: bc::Outpoint::new(Txid::from([0xaa; 32]), Vout::from_u32(0)),
            sequence: SeqNo::from_consensus_u32(u32::MAX),
        }],
        outputs: scripts
            .iter()
            .map(|spk| TxOut::new(ScriptPubkey::from_unsafe(spk.clone()), Sats(PREV_VALUE)))
            .collect(),
        lock_time: LockTime::ZERO,
    }
    .to_tx()
}

/// Version 2 packet spending the outputs of [`funding_tx`] with one payment output. Every input
/// gets its witness UTXO and the full funding transaction.
pub fn spending_psbt(scripts: &[Vec<u8>]) -> Psbt {
    let funding = funding_tx(scripts);
    let txid = funding.txid();
    let mut psbt = Psbt::create_v2(TxVer::V2, None, scripts.len(), 1);
    for (no, spk) in scripts.iter().enumerate() {
        psbt.set_input_meta(
            no,
            txid,
            Vout::from_u32(no as u32),
            SeqNo::from_consensus_u32(0xffff_fffd),
        )
        .unwrap();
        let utxo = TxOut::new(ScriptPubkey::from_unsafe(spk.clone()), Sats(PREV_VALUE));
        psbt.set_utxo(no, Some(utxo), Some(funding.clone())).unwrap();
    }
    psbt.set_output_meta(
        0,
        Sats(PREV_VALUE * scripts.len() as u64 - 1_000),
        ScriptPubkey::from_unsafe(p2wpkh(&TestKey::new(0x99).compressed())),
    )
    .unwrap();
    psbt
}

/// Serializes and parses the packet back, checking that nothing is lost on the way.
pub fn roundtrip(psbt: &Psbt) -> Psbt {
    let data = psbt.serialize().unwrap();
    let decoded = Psbt::deserialize(&data).unwrap();
    assert_eq!(&decoded, psbt);
    assert_eq!(decoded.serialize().unwrap(), data);
    decoded
}
