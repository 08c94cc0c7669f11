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

use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;

use amplify::{ByteArray, Bytes, Bytes4, IoError};
use base64::Engine;
use bc::secp256k1::XOnlyPublicKey;
use bc::{
    Bip340Sig, CompressedPk, ConsensusDataError, ConsensusDecode, ConsensusDecodeError,
    ConsensusEncode, LegacySig, LockTime, NonStandardValue, Outpoint, RedeemScript, Sats,
    ScriptPubkey, SeqNo, SigError, SigScript, SighashType, TapLeafHash, TapScript, Tx, TxOut,
    TxVer, Txid, VarInt, Vout, Witness, WitnessScript, XOnlyPk,
};
use indexmap::IndexMap;

use crate::keys::KeyValue;
use crate::maps::{Map, MapName};
use crate::taproot::{parse_control_block, serialize_control_block};
use crate::{
    GlobalKey, Input, InputKey, InvalidControlBlock, KeyOrigin, KeyPair, KeyType, Output,
    OutputKey, PropKey, Psbt, PsbtUnsupportedVer, PsbtVer, TxTemplate, ValueData,
};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum DecodeError {
    #[from]
    #[from(io::Error)]
    Io(IoError),

    #[from]
    #[from(ConsensusDataError)]
    #[from(PsbtUnsupportedVer)]
    #[from(NonStandardValue<u32>)]
    #[from(SigError)]
    #[from(InvalidControlBlock)]
    Psbt(PsbtError),
}

impl From<ConsensusDecodeError> for DecodeError {
    fn from(e: ConsensusDecodeError) -> Self {
        match e {
            ConsensusDecodeError::Io(e) => DecodeError::Io(e),
            ConsensusDecodeError::Data(data) => data.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PsbtError {
    /// unexpected end of data.
    UnexpectedEod,

    /// PSBT data are followed by some excessive bytes.
    DataNotConsumed,

    /// invalid magic bytes {0}.
    InvalidMagic(Bytes<5>),

    /// {0} key {1:#04x} must not be present in PSBT {2}.
    UnexpectedKey(MapName, u8, PsbtVer),

    /// {0} key {1:#04x} required for PSBT {2} is not present.
    RequiredKeyAbsent(MapName, u8, PsbtVer),

    /// repeated {0} key {1:#04x}.
    RepeatedKey(MapName, u8),

    /// repeated {0} proprietary key {1}.
    RepeatedPropKey(MapName, PropKey),

    /// repeated {0} unknown key {1:#04x}.
    RepeatedUnknownKey(MapName, u8),

    /// {0} key {1:#04x} must not contain additional key data.
    NonEmptyKeyData(MapName, u8),

    /// invalid key data for {0} key {1:#04x}.
    InvalidKeyData(MapName, u8),

    #[from]
    #[display(inner)]
    UnsupportedVersion(PsbtUnsupportedVer),

    #[from]
    #[display(inner)]
    InvalidSig(SigError),

    #[from]
    #[display(inner)]
    InvalidSighash(NonStandardValue<u32>),

    #[from]
    #[display(inner)]
    InvalidControlBlock(InvalidControlBlock),

    /// leaf version of the script of input #{0} doesn't match the version in its control block.
    LeafVersionMismatch(usize),

    /// input #{0} provides multiple taproot leaf scripts, while only a single script path can
    /// be spent.
    MultipleTapLeaves(usize),

    /// input #{0} is finalized but still carries data used for signing it.
    FinalWithSigningMaterial(usize),

    /// key origin data of {0} bytes is not a fingerprint followed by derivation indexes.
    InvalidKeyOrigin(usize),

    /// malformed witness stack.
    InvalidWitnessStack,

    #[from]
    #[display(inner)]
    Consensus(ConsensusDataError),
}

impl From<DecodeError> for PsbtError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Psbt(e) => e,
            DecodeError::Io(_) => PsbtError::UnexpectedEod,
        }
    }
}

/// Errors preventing a packet from being serialized.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum EncodeError {
    /// only PSBT v2 can be serialized, while the packet is {0}.
    UnsupportedVersion(PsbtVer),

    /// PSBT must have at least one input.
    NoInputs,

    /// PSBT must have at least one output.
    NoOutputs,

    /// input #{0} has no previous outpoint set.
    InputMeta(usize),

    /// output #{0} has no amount or script set.
    OutputMeta(usize),

    /// input #{0} has taproot leaf script without control block, or vice versa.
    IncompleteTapLeaf(usize),

    /// input #{0} is finalized but still carries data used for signing it.
    FinalWithSigningMaterial(usize),

    #[from]
    #[from(io::Error)]
    #[display(inner)]
    Io(IoError),
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum PsbtParseError {
    #[from]
    Base64(base64::DecodeError),

    #[from]
    Psbt(PsbtError),
}

pub trait Encode {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError>;
}

impl<'a, T: Encode> Encode for &'a T {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> { (*self).encode(writer) }
}

pub trait Decode
where Self: Sized
{
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError>;
    fn deserialize(bytes: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let bytes = bytes.as_ref();
        let mut cursor = Cursor::new(bytes);
        let me = Self::decode(&mut cursor)?;
        if cursor.position() != bytes.len() as u64 {
            return Err(PsbtError::DataNotConsumed);
        }
        Ok(me)
    }
}

/// Byte string written as-is, without a length prefix.
pub struct RawBytes<T: AsRef<[u8]>>(pub T);

impl<T: AsRef<[u8]>> Encode for RawBytes<T> {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let bytes = self.0.as_ref();
        writer.write_all(bytes)?;
        Ok(bytes.len())
    }
}

fn base64_engine() -> base64::engine::GeneralPurpose {
    base64::engine::GeneralPurpose::new(
        &base64::alphabet::STANDARD,
        base64::engine::GeneralPurposeConfig::new(),
    )
}

fn read_exact_vec(reader: &mut impl Read, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut data = Vec::with_capacity(len.min(0x10000));
    reader.take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(PsbtError::UnexpectedEod.into());
    }
    Ok(data)
}

impl Psbt {
    const MAGIC: [u8; 5] = *b"psbt\xFF";
    pub(crate) const SEPARATOR: [u8; 1] = [0x0];

    /// Checks that the packet can be serialized: it must be in the explicit-field format,
    /// non-empty and with all per-input and per-output transaction data present.
    pub fn check_encodable(&self) -> Result<(), EncodeError> {
        if self.version() != PsbtVer::V2 {
            return Err(EncodeError::UnsupportedVersion(self.version()));
        }
        if self.inputs.is_empty() {
            return Err(EncodeError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(EncodeError::NoOutputs);
        }
        for input in &self.inputs {
            if input.previous_outpoint.is_none() {
                return Err(EncodeError::InputMeta(input.index));
            }
            if input.tap_leaf_script.is_some() != input.tap_control_block.is_some() {
                return Err(EncodeError::IncompleteTapLeaf(input.index));
            }
            if input.is_final() && input.has_signing_material() {
                return Err(EncodeError::FinalWithSigningMaterial(input.index));
            }
        }
        for output in &self.outputs {
            if output.amount.is_none() || output.script.is_none() {
                return Err(EncodeError::OutputMeta(output.index));
            }
        }
        Ok(())
    }

    pub fn encode(&self, writer: &mut impl Write) -> Result<usize, EncodeError> {
        self.check_encodable()?;

        let mut counter = Self::MAGIC.len();
        writer.write_all(&Self::MAGIC)?;

        counter += self.encode_global(writer)?;

        for input in &self.inputs {
            counter += input.encode(writer)?;
        }

        for output in &self.outputs {
            counter += output.encode(writer)?;
        }

        trace!(
            "encoded PSBT with {} inputs and {} outputs into {counter} bytes",
            self.inputs.len(),
            self.outputs.len()
        );
        Ok(counter)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut vec = Vec::new();
        self.encode(&mut vec)?;
        Ok(vec)
    }

    pub fn to_base64(&self) -> Result<String, EncodeError> {
        self.serialize().map(|data| base64_engine().encode(data))
    }

    pub fn from_base64(s: &str) -> Result<Self, PsbtParseError> {
        let data = base64_engine().decode(s.trim())?;
        Psbt::deserialize(data).map_err(PsbtParseError::from)
    }

    fn encode_global(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter += KeyPair::new(GlobalKey::Version, (), PsbtVer::V2).encode(writer)?;
        counter += KeyPair::new(GlobalKey::TxVersion, (), self.tx_version()).encode(writer)?;
        if let TxTemplate::Explicit {
            fallback_locktime: Some(lock_time),
            ..
        } = self.template
        {
            counter += KeyPair::new(GlobalKey::FallbackLocktime, (), lock_time).encode(writer)?;
        }
        counter += KeyPair::new(GlobalKey::InputCount, (), VarInt::with(self.inputs.len()))
            .encode(writer)?;
        counter += KeyPair::new(GlobalKey::OutputCount, (), VarInt::with(self.outputs.len()))
            .encode(writer)?;

        counter += encode_extra(GlobalKey::Proprietary, &self.proprietary, &self.unknown, writer)?;

        counter += Self::SEPARATOR.len();
        writer.write_all(&Self::SEPARATOR)?;

        Ok(counter)
    }

    pub fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut magic = Self::MAGIC;
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(PsbtError::InvalidMagic(magic.into()).into());
        }

        let mut map = Map::<GlobalKey>::parse(MapName::Global, reader)?;
        let version = match map.singular.get(&GlobalKey::Version) {
            Some(data) => PsbtVer::deserialize(data)?,
            None => PsbtVer::V0,
        };
        if version != PsbtVer::V2 {
            return Err(PsbtError::UnsupportedVersion(PsbtUnsupportedVer(
                version.to_standard_u32(),
            ))
            .into());
        }
        map.check(PsbtVer::V2)?;

        let tx_version = TxVer::deserialize(required(&mut map, GlobalKey::TxVersion)?)?;
        let fallback_locktime =
            map.take(GlobalKey::FallbackLocktime).map(LockTime::deserialize).transpose()?;
        let input_count =
            VarInt::deserialize(required(&mut map, GlobalKey::InputCount)?)?.to_usize();
        let output_count =
            VarInt::deserialize(required(&mut map, GlobalKey::OutputCount)?)?.to_usize();

        let mut psbt = Psbt::create_v2(tx_version, fallback_locktime, 0, 0);
        psbt.proprietary = map.proprietary;
        psbt.unknown = map.unknown;

        for index in 0..input_count {
            let map = Map::<InputKey>::parse(MapName::Input, reader)?;
            psbt.inputs.push(Input::from_map(index, map)?);
        }

        for index in 0..output_count {
            let map = Map::<OutputKey>::parse(MapName::Output, reader)?;
            psbt.outputs.push(Output::from_map(index, map)?);
        }

        trace!("decoded PSBT v2 with {input_count} inputs and {output_count} outputs");
        Ok(psbt)
    }

    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let data = data.as_ref();
        let mut cursor = Cursor::new(data);
        let psbt = Psbt::decode(&mut cursor)?;
        if cursor.position() != data.len() as u64 {
            return Err(PsbtError::DataNotConsumed);
        }
        Ok(psbt)
    }
}

impl FromStr for Psbt {
    type Err = PsbtParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Psbt::from_base64(s) }
}

fn required<K: KeyType>(map: &mut Map<K>, key_type: K) -> Result<ValueData, PsbtError> {
    map.take(key_type)
        .ok_or(PsbtError::RequiredKeyAbsent(map.name, key_type.to_u8(), PsbtVer::V2))
}

fn encode_extra<K: KeyType>(
    proprietary_type: K,
    proprietary: &IndexMap<PropKey, ValueData>,
    unknown: &IndexMap<u8, IndexMap<Vec<u8>, ValueData>>,
    writer: &mut impl Write,
) -> Result<usize, IoError> {
    let mut counter = 0;
    for (key_data, value_data) in proprietary {
        counter += KeyPair::new(proprietary_type, key_data, RawBytes(value_data)).encode(writer)?;
    }
    for (key_type, submap) in unknown {
        for (key_data, value_data) in submap {
            counter += KeyPair::new(K::from_u8(*key_type), RawBytes(key_data), RawBytes(value_data))
                .encode(writer)?;
        }
    }
    Ok(counter)
}

fn compr_pk(map: MapName, key_type: u8, data: &[u8]) -> Result<CompressedPk, PsbtError> {
    if data.len() != 33 {
        return Err(PsbtError::InvalidKeyData(map, key_type));
    }
    CompressedPk::from_bytes(data).map_err(|_| PsbtError::InvalidKeyData(map, key_type))
}

fn xonly_pk(map: MapName, key_type: u8, data: &[u8]) -> Result<XOnlyPk, PsbtError> {
    XOnlyPublicKey::from_slice(data)
        .map(XOnlyPk::from)
        .map_err(|_| PsbtError::InvalidKeyData(map, key_type))
}

/// Serializes explicit witness stack items as a compact-size counted list of compact-size
/// prefixed byte strings.
fn encode_stack(items: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    VarInt::with(items.len()).encode(&mut data).expect("in-memory writer doesn't fail");
    for item in items {
        VarInt::with(item.len()).encode(&mut data).expect("in-memory writer doesn't fail");
        data.extend_from_slice(item);
    }
    data
}

fn decode_stack(data: &[u8]) -> Result<Vec<Vec<u8>>, PsbtError> {
    let mut cursor = Cursor::new(data);
    let count = VarInt::decode(&mut cursor)
        .map_err(|_| PsbtError::InvalidWitnessStack)?
        .to_usize();
    let mut items = Vec::with_capacity(count.min(data.len()));
    for _ in 0..count {
        let len = VarInt::decode(&mut cursor)
            .map_err(|_| PsbtError::InvalidWitnessStack)?
            .to_usize();
        items.push(read_exact_vec(&mut cursor, len).map_err(|_| PsbtError::InvalidWitnessStack)?);
    }
    if cursor.position() != data.len() as u64 {
        return Err(PsbtError::InvalidWitnessStack);
    }
    Ok(items)
}

impl Input {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        if let Some(outpoint) = self.previous_outpoint {
            counter += KeyPair::new(InputKey::PreviousTxid, (), outpoint.txid).encode(writer)?;
            counter += KeyPair::new(InputKey::OutputIndex, (), outpoint.vout).encode(writer)?;
        }
        if let Some(sequence) = self.sequence_number {
            counter += KeyPair::new(InputKey::Sequence, (), sequence).encode(writer)?;
        }

        if let Some(tx) = &self.non_witness_tx {
            counter += KeyPair::new(InputKey::NonWitnessUtxo, (), tx).encode(writer)?;
        }
        if let Some(txout) = &self.witness_utxo {
            counter += KeyPair::new(InputKey::WitnessUtxo, (), txout).encode(writer)?;
        }

        for (pk, sig) in &self.partial_sigs {
            counter +=
                KeyPair::new(InputKey::PartialSig, RawBytes(pk.serialize()), RawBytes(sig.to_vec()))
                    .encode(writer)?;
        }
        if let Some(sighash_type) = self.sighash_type {
            counter += KeyPair::new(InputKey::SighashType, (), sighash_type).encode(writer)?;
        }
        if let Some(script) = &self.redeem_script {
            counter += KeyPair::new(InputKey::RedeemScript, (), RawBytes(script.as_slice()))
                .encode(writer)?;
        }
        if let Some(script) = &self.witness_script {
            counter += KeyPair::new(InputKey::WitnessScript, (), RawBytes(script.as_slice()))
                .encode(writer)?;
        }
        for (pk, origin) in &self.bip32_derivation {
            counter += KeyPair::new(InputKey::Bip32Derivation, RawBytes(pk.serialize()), origin)
                .encode(writer)?;
        }

        if let Some(script) = &self.final_script_sig {
            counter += KeyPair::new(InputKey::FinalScriptSig, (), RawBytes(script.as_slice()))
                .encode(writer)?;
        }
        if let Some(witness) = &self.final_witness {
            counter += KeyPair::new(InputKey::FinalWitness, (), witness).encode(writer)?;
        }

        if let Some(sig) = &self.tap_key_sig {
            counter +=
                KeyPair::new(InputKey::TapKeySig, (), RawBytes(sig.to_vec())).encode(writer)?;
        }
        for ((pk, leaf_hash), sig) in &self.tap_script_sig {
            let mut key_data = Vec::with_capacity(64);
            key_data.extend_from_slice(&pk.to_byte_array());
            key_data.extend_from_slice(&leaf_hash.to_byte_array());
            counter +=
                KeyPair::new(InputKey::TapScriptSig, RawBytes(key_data), RawBytes(sig.to_vec()))
                    .encode(writer)?;
        }
        if let (Some(script), Some(cb)) = (&self.tap_leaf_script, &self.tap_control_block) {
            let mut value = script.as_slice().to_vec();
            value.push(cb.leaf_version.to_consensus_u8());
            let key_data = serialize_control_block(cb);
            counter += KeyPair::new(InputKey::TapLeafScript, RawBytes(key_data), RawBytes(value))
                .encode(writer)?;
        }

        if let Some(annex) = &self.tap_annex {
            counter += KeyPair::new(
                InputKey::Proprietary,
                PropKey::own(PropKey::SUBTYPE_ANNEX),
                RawBytes(annex),
            )
            .encode(writer)?;
        }
        if !self.witness_stack.is_empty() {
            counter += KeyPair::new(
                InputKey::Proprietary,
                PropKey::own(PropKey::SUBTYPE_WITNESS_STACK),
                RawBytes(encode_stack(&self.witness_stack)),
            )
            .encode(writer)?;
        }
        let proprietary: IndexMap<PropKey, ValueData> = self
            .proprietary
            .iter()
            .filter(|(key, _)| {
                !key.is_own(PropKey::SUBTYPE_ANNEX) && !key.is_own(PropKey::SUBTYPE_WITNESS_STACK)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        counter += encode_extra(InputKey::Proprietary, &proprietary, &self.unknown, writer)?;

        counter += Psbt::SEPARATOR.len();
        writer.write_all(&Psbt::SEPARATOR)?;

        Ok(counter)
    }

    fn from_map(index: usize, mut map: Map<InputKey>) -> Result<Self, PsbtError> {
        map.check(PsbtVer::V2)?;
        let name = map.name;
        let mut input = Input::new(index);

        let txid = Txid::deserialize(required(&mut map, InputKey::PreviousTxid)?)?;
        let vout = Vout::deserialize(required(&mut map, InputKey::OutputIndex)?)?;
        input.previous_outpoint = Some(Outpoint::new(txid, vout));
        input.sequence_number = map.take(InputKey::Sequence).map(SeqNo::deserialize).transpose()?;

        input.non_witness_tx = map.take(InputKey::NonWitnessUtxo).map(Tx::deserialize).transpose()?;
        input.witness_utxo = map.take(InputKey::WitnessUtxo).map(TxOut::deserialize).transpose()?;
        input.sighash_type =
            map.take(InputKey::SighashType).map(SighashType::deserialize).transpose()?;
        input.redeem_script = map.take(InputKey::RedeemScript).map(RedeemScript::from_unsafe);
        input.witness_script = map.take(InputKey::WitnessScript).map(WitnessScript::from_unsafe);
        input.final_script_sig = map.take(InputKey::FinalScriptSig).map(SigScript::from_unsafe);
        input.final_witness =
            map.take(InputKey::FinalWitness).map(Witness::deserialize).transpose()?;
        input.tap_key_sig = map
            .take(InputKey::TapKeySig)
            .map(|data| Bip340Sig::from_bytes(&data))
            .transpose()?;

        for (key_data, value_data) in map.take_plural(InputKey::PartialSig) {
            let pk = compr_pk(name, InputKey::PartialSig.to_u8(), &key_data)?;
            input.partial_sigs.insert(pk, LegacySig::from_bytes(&value_data)?);
        }
        for (key_data, value_data) in map.take_plural(InputKey::Bip32Derivation) {
            let pk = compr_pk(name, InputKey::Bip32Derivation.to_u8(), &key_data)?;
            input.bip32_derivation.insert(pk, KeyOrigin::deserialize(value_data)?);
        }
        for (key_data, value_data) in map.take_plural(InputKey::TapScriptSig) {
            let key_type = InputKey::TapScriptSig.to_u8();
            if key_data.len() != 64 {
                return Err(PsbtError::InvalidKeyData(name, key_type));
            }
            let pk = xonly_pk(name, key_type, &key_data[..32])?;
            let leaf_hash = TapLeafHash::from_slice_unsafe(&key_data[32..]);
            input.tap_script_sig.insert((pk, leaf_hash), Bip340Sig::from_bytes(&value_data)?);
        }
        let mut leaves = map.take_plural(InputKey::TapLeafScript);
        if leaves.len() > 1 {
            return Err(PsbtError::MultipleTapLeaves(index));
        }
        if let Some((key_data, mut value_data)) = leaves.pop_first() {
            let cb = parse_control_block(&key_data)?;
            if value_data.pop() != Some(cb.leaf_version.to_consensus_u8()) {
                return Err(PsbtError::LeafVersionMismatch(index));
            }
            input.tap_leaf_script = Some(TapScript::from_unsafe(value_data));
            input.tap_control_block = Some(cb);
        }

        input.tap_annex = map.take_own(PropKey::SUBTYPE_ANNEX);
        if let Some(data) = map.take_own(PropKey::SUBTYPE_WITNESS_STACK) {
            input.witness_stack = decode_stack(&data)?;
        }
        input.proprietary = map.proprietary;
        input.unknown = map.unknown;

        if input.is_final() && input.has_signing_material() {
            return Err(PsbtError::FinalWithSigningMaterial(index));
        }
        Ok(input)
    }
}

impl Output {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        if let Some(amount) = self.amount {
            counter += KeyPair::new(OutputKey::Amount, (), amount).encode(writer)?;
        }
        if let Some(script) = &self.script {
            counter +=
                KeyPair::new(OutputKey::Script, (), RawBytes(script.as_slice())).encode(writer)?;
        }
        if let Some(script) = &self.redeem_script {
            counter += KeyPair::new(OutputKey::RedeemScript, (), RawBytes(script.as_slice()))
                .encode(writer)?;
        }
        if let Some(script) = &self.witness_script {
            counter += KeyPair::new(OutputKey::WitnessScript, (), RawBytes(script.as_slice()))
                .encode(writer)?;
        }
        for (pk, origin) in &self.bip32_derivation {
            counter += KeyPair::new(OutputKey::Bip32Derivation, RawBytes(pk.serialize()), origin)
                .encode(writer)?;
        }

        counter += encode_extra(OutputKey::Proprietary, &self.proprietary, &self.unknown, writer)?;

        counter += Psbt::SEPARATOR.len();
        writer.write_all(&Psbt::SEPARATOR)?;

        Ok(counter)
    }

    fn from_map(index: usize, mut map: Map<OutputKey>) -> Result<Self, PsbtError> {
        map.check(PsbtVer::V2)?;
        let name = map.name;
        let mut output = Output::new(index);

        output.amount = Some(Sats::deserialize(required(&mut map, OutputKey::Amount)?)?);
        output.script = Some(ScriptPubkey::from_unsafe(required(&mut map, OutputKey::Script)?));
        output.redeem_script = map.take(OutputKey::RedeemScript).map(RedeemScript::from_unsafe);
        output.witness_script =
            map.take(OutputKey::WitnessScript).map(WitnessScript::from_unsafe);
        for (key_data, value_data) in map.take_plural(OutputKey::Bip32Derivation) {
            let pk = compr_pk(name, OutputKey::Bip32Derivation.to_u8(), &key_data)?;
            output.bip32_derivation.insert(pk, KeyOrigin::deserialize(value_data)?);
        }
        output.proprietary = map.proprietary;
        output.unknown = map.unknown;

        Ok(output)
    }
}

impl Encode for GlobalKey {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_u8().encode(writer)
    }
}

impl Decode for GlobalKey {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        u8::decode(reader).map(Self::from_u8)
    }
}

impl Encode for InputKey {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_u8().encode(writer)
    }
}

impl Decode for InputKey {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        u8::decode(reader).map(Self::from_u8)
    }
}

impl Encode for OutputKey {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_u8().encode(writer)
    }
}

impl Decode for OutputKey {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        u8::decode(reader).map(Self::from_u8)
    }
}

impl<T: KeyType, K: Encode, V: Encode> Encode for KeyPair<T, K, V> {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter += self.key_len().encode(writer)?;
        counter += self.key_type.encode(writer)?;
        counter += self.key_data.encode(writer)?;

        counter += self.value_len().encode(writer)?;
        counter += self.value_data.encode(writer)?;

        Ok(counter)
    }
}

impl<T: KeyType> Decode for KeyValue<T> {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let key_len = VarInt::decode(reader)?.to_usize();
        if key_len == 0 {
            return Ok(KeyValue::Separator);
        }

        let key_type = T::decode(reader)?;
        let key_data = read_exact_vec(reader, key_len - 1)?;

        let value_len = VarInt::decode(reader)?.to_usize();
        let value_data = read_exact_vec(reader, value_len)?;

        Ok(KeyValue::Pair(KeyPair {
            key_type,
            key_data,
            value_data,
        }))
    }
}

impl Encode for PropKey {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.identifier.len();
        let len = VarInt::with(counter);
        counter += len.encode(writer)?;

        writer.write_all(self.identifier.as_bytes())?;
        counter += VarInt::new(self.subtype).encode(writer)?;
        counter += self.data.len();
        writer.write_all(&self.data)?;

        Ok(counter)
    }
}

impl Decode for PropKey {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let len = VarInt::decode(reader)?.to_usize();
        let identifier = read_exact_vec(reader, len)?;
        let identifier = String::from_utf8_lossy(&identifier).to_string();

        let subtype = VarInt::decode(reader)?.to_u64();

        let mut data = Vec::<u8>::new();
        reader.read_to_end(&mut data)?;

        Ok(PropKey {
            identifier,
            subtype,
            data,
        })
    }
}

impl Encode for PsbtVer {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_standard_u32().encode(writer)
    }
}

impl Decode for PsbtVer {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let ver = u32::decode(reader)?;
        PsbtVer::try_from_standard_u32(ver).map_err(DecodeError::from)
    }
}

impl Encode for KeyOrigin {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(&self.master_fp.to_byte_array())?;
        for index in &self.derivation {
            index.encode(writer)?;
        }
        Ok(4 + self.derivation.len() * 4)
    }
}

impl Decode for KeyOrigin {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if data.len() < 4 || data.len() % 4 != 0 {
            return Err(PsbtError::InvalidKeyOrigin(data.len()).into());
        }
        let mut master_fp = [0u8; 4];
        master_fp.copy_from_slice(&data[..4]);
        let derivation = data[4..].chunks_exact(4).map(|chunk| {
            let mut index = [0u8; 4];
            index.copy_from_slice(chunk);
            u32::from_le_bytes(index)
        });
        Ok(KeyOrigin::new(Bytes4::from(master_fp), derivation))
    }
}

impl Encode for SighashType {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_consensus_u32().encode(writer)
    }
}

impl Decode for SighashType {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let val = u32::decode(reader)?;
        SighashType::from_standard_u32(val).map_err(DecodeError::from)
    }
}

macro_rules! psbt_code_using_consensus {
    ($ty:ty) => {
        psbt_encode_from_consensus!($ty);
        psbt_decode_from_consensus!($ty);
    };
}

macro_rules! psbt_encode_from_consensus {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                self.consensus_encode(writer)
            }
        }
    };
}

macro_rules! psbt_decode_from_consensus {
    ($ty:ty) => {
        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                Self::consensus_decode(reader).map_err(DecodeError::from)
            }
        }
    };
}

psbt_code_using_consensus!(Tx);
psbt_code_using_consensus!(TxVer);
psbt_code_using_consensus!(TxOut);
psbt_code_using_consensus!(Txid);
psbt_code_using_consensus!(Vout);
psbt_code_using_consensus!(SeqNo);
psbt_code_using_consensus!(LockTime);
psbt_code_using_consensus!(Witness);
psbt_code_using_consensus!(Sats);
psbt_code_using_consensus!(u8);
psbt_code_using_consensus!(u32);
psbt_code_using_consensus!(VarInt);

impl Encode for () {
    fn encode(&self, _writer: &mut impl Write) -> Result<usize, IoError> { Ok(0) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prop_key_roundtrip() {
        let key = PropKey {
            identifier: s!("acme"),
            subtype: 0x1234,
            data: vec![1, 2, 3],
        };
        let mut data = vec![];
        key.encode(&mut data).unwrap();
        assert_eq!(PropKey::deserialize(&data).unwrap(), key);
    }

    #[test]
    fn key_origin_coding() {
        let origin = KeyOrigin::new([0xde, 0xad, 0xbe, 0xef], [84 | 1 << 31, 0, 1]);
        let mut data = vec![];
        assert_eq!(origin.encode(&mut data).unwrap(), 16);
        assert_eq!(&data[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&data[4..8], &[84, 0, 0, 0x80]);
        assert_eq!(KeyOrigin::deserialize(&data).unwrap(), origin);
        assert_eq!(KeyOrigin::deserialize(&data[..6]), Err(PsbtError::InvalidKeyOrigin(6)));
    }

    #[test]
    fn witness_stack_coding() {
        let stack = vec![vec![], vec![0xab; 3], vec![0x01; 300]];
        let data = encode_stack(&stack);
        assert_eq!(data[0], 3);
        assert_eq!(decode_stack(&data).unwrap(), stack);
        assert_eq!(decode_stack(&data[..data.len() - 1]), Err(PsbtError::InvalidWitnessStack));
    }

    #[test]
    fn truncated_value() {
        // key of one byte, value claims 5 bytes but only 2 are present
        let data = [0x01, 0x42, 0x05, 0x00, 0x00];
        assert_eq!(
            KeyValue::<GlobalKey>::deserialize(data).err(),
            Some(PsbtError::UnexpectedEod)
        );
    }

    #[test]
    fn bad_magic() {
        assert_eq!(
            Psbt::deserialize(b"psbu\xff\x00"),
            Err(PsbtError::InvalidMagic(Bytes::from(*b"psbu\xff")))
        );
        assert!(Psbt::deserialize(b"psb").is_err());
    }
}
