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

use bc::opcodes::{
    OP_CHECKMULTISIG, OP_CHECKSIG, OP_CHECKSIGADD, OP_CODESEPARATOR, OP_PUSHBYTES_0,
    OP_PUSHBYTES_75, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_PUSHNUM_1, OP_PUSHNUM_16,
};
use bc::{CompressedPk, ScriptPubkey};
use bitcoin_hashes::{hash160, sha256, Hash};

/// Class of a locking script, detected from its exact byte pattern.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display(lowercase)]
pub enum ScriptClass {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    Unknown,
}

impl ScriptClass {
    pub fn classify(script: &[u8]) -> Self {
        let script = ScriptPubkey::from_unsafe(script.to_vec());
        if script.is_p2pkh() {
            ScriptClass::P2pkh
        } else if script.is_p2sh() {
            ScriptClass::P2sh
        } else if script.is_p2wpkh() {
            ScriptClass::P2wpkh
        } else if script.is_p2wsh() {
            ScriptClass::P2wsh
        } else if script.is_p2tr() {
            ScriptClass::P2tr
        } else {
            ScriptClass::Unknown
        }
    }

    #[inline]
    pub fn is_segwit(self) -> bool {
        matches!(self, ScriptClass::P2wpkh | ScriptClass::P2wsh | ScriptClass::P2tr)
    }

    /// Returns the hash or key committed by a script of this class, if the class commits to one.
    pub fn commitment(self, script: &[u8]) -> Option<&[u8]> {
        if ScriptClass::classify(script) != self {
            return None;
        }
        match self {
            ScriptClass::P2pkh => script.get(3..23),
            ScriptClass::P2sh | ScriptClass::P2wpkh => script.get(2..22),
            ScriptClass::P2wsh | ScriptClass::P2tr => script.get(2..34),
            ScriptClass::Unknown => None,
        }
    }
}

/// Script class of an input taking into account P2SH wrapping.
///
/// P2SH is never flattened: the class of the redeem script is kept as the inner class, so
/// `p2sh(p2wpkh)` and `p2wpkh` stay distinct for all roles.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum SpendClass {
    #[display("p2pkh")]
    P2pkh,

    #[display("p2wpkh")]
    P2wpkh,

    #[display("p2wsh")]
    P2wsh,

    #[display("p2tr")]
    P2tr,

    #[display("unknown")]
    Unknown,

    /// P2SH with a known redeem script of the given class.
    #[display("p2sh({0})")]
    P2sh(ScriptClass),

    /// P2SH output for which the redeem script is not known yet.
    #[display("p2sh(?)")]
    P2shOpaque,
}

impl SpendClass {
    pub fn with(script_pubkey: &[u8], redeem_script: Option<&[u8]>) -> Self {
        match ScriptClass::classify(script_pubkey) {
            ScriptClass::P2pkh => SpendClass::P2pkh,
            ScriptClass::P2wpkh => SpendClass::P2wpkh,
            ScriptClass::P2wsh => SpendClass::P2wsh,
            ScriptClass::P2tr => SpendClass::P2tr,
            ScriptClass::Unknown => SpendClass::Unknown,
            ScriptClass::P2sh => match redeem_script {
                Some(redeem) => SpendClass::P2sh(ScriptClass::classify(redeem)),
                None => SpendClass::P2shOpaque,
            },
        }
    }

    /// Class which defines the signing and satisfaction rules.
    pub fn effective(self) -> ScriptClass {
        match self {
            SpendClass::P2pkh => ScriptClass::P2pkh,
            SpendClass::P2wpkh => ScriptClass::P2wpkh,
            SpendClass::P2wsh => ScriptClass::P2wsh,
            SpendClass::P2tr => ScriptClass::P2tr,
            SpendClass::Unknown => ScriptClass::Unknown,
            SpendClass::P2sh(inner) => inner,
            SpendClass::P2shOpaque => ScriptClass::P2sh,
        }
    }

    #[inline]
    pub fn is_nested(self) -> bool {
        matches!(self, SpendClass::P2sh(_) | SpendClass::P2shOpaque)
    }
}

/// Single parsed element of a script.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Instr<'s> {
    Op(u8),
    Push(&'s [u8]),
}

/// Iterator over script instructions. Stops at the first malformed push.
pub struct Instructions<'s> {
    script: &'s [u8],
    pos: usize,
}

impl<'s> Instructions<'s> {
    pub fn new(script: &'s [u8]) -> Self { Instructions { script, pos: 0 } }

    /// Offset of the next instruction.
    #[inline]
    pub fn position(&self) -> usize { self.pos }

    fn take(&mut self, len: usize) -> Option<&'s [u8]> {
        let end = self.pos.checked_add(len)?;
        let data = self.script.get(self.pos..end)?;
        self.pos = end;
        Some(data)
    }

    fn take_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.take(width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }
}

impl<'s> Iterator for Instructions<'s> {
    type Item = Instr<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = *self.script.get(self.pos)?;
        self.pos += 1;
        let len = match op {
            0x01..=OP_PUSHBYTES_75 => op as usize,
            OP_PUSHDATA1 => self.take_len(1)?,
            OP_PUSHDATA2 => self.take_len(2)?,
            OP_PUSHDATA4 => self.take_len(4)?,
            _ => return Some(Instr::Op(op)),
        };
        match self.take(len) {
            Some(data) => Some(Instr::Push(data)),
            None => {
                self.pos = self.script.len();
                None
            }
        }
    }
}

/// Bare M-of-N `OP_CHECKMULTISIG` template over compressed keys.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Multisig {
    pub threshold: usize,
    pub keys: Vec<CompressedPk>,
}

impl Multisig {
    pub fn parse(script: &[u8]) -> Option<Self> {
        let mut instrs = Instructions::new(script).collect::<Vec<_>>();
        if instrs.len() < 4 || instrs.pop()? != Instr::Op(OP_CHECKMULTISIG) {
            return None;
        }
        let threshold = match *instrs.first()? {
            Instr::Op(op @ OP_PUSHNUM_1..=OP_PUSHNUM_16) => (op - OP_PUSHNUM_1 + 1) as usize,
            _ => return None,
        };
        let count = match *instrs.last()? {
            Instr::Op(op @ OP_PUSHNUM_1..=OP_PUSHNUM_16) => (op - OP_PUSHNUM_1 + 1) as usize,
            _ => return None,
        };
        let keys = instrs[1..instrs.len() - 1]
            .iter()
            .map(|instr| match instr {
                Instr::Push(data) if data.len() == 33 => CompressedPk::from_bytes(data).ok(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if keys.len() != count || threshold > count {
            return None;
        }
        Some(Multisig { threshold, keys })
    }
}

/// Counts signature checks (`OP_CHECKSIG` and `OP_CHECKSIGADD`) in a tapscript.
pub fn count_sig_ops(script: &[u8]) -> usize {
    Instructions::new(script)
        .filter(|instr| matches!(instr, Instr::Op(OP_CHECKSIG) | Instr::Op(OP_CHECKSIGADD)))
        .count()
}

/// Lists 32-byte x-only keys pushed in a tapscript, in script order.
pub fn xonly_pushes(script: &[u8]) -> Vec<[u8; 32]> {
    Instructions::new(script)
        .filter_map(|instr| match instr {
            Instr::Push(data) => <[u8; 32]>::try_from(data).ok(),
            Instr::Op(_) => None,
        })
        .collect()
}

/// Copy of the script with every `OP_CODESEPARATOR` removed. A malformed trailing push is kept
/// as is.
pub fn remove_code_separators(script: &[u8]) -> Vec<u8> {
    let mut stripped = Vec::with_capacity(script.len());
    let mut instrs = Instructions::new(script);
    let mut start = 0;
    while let Some(instr) = instrs.next() {
        let end = instrs.position();
        if instr != Instr::Op(OP_CODESEPARATOR) {
            stripped.extend_from_slice(&script[start..end]);
        }
        start = end;
    }
    stripped.extend_from_slice(&script[start..]);
    stripped
}

/// Appends minimal push of `data` to the script.
pub fn push_slice(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => script.push(OP_PUSHBYTES_0),
        len @ 1..=0x4b => script.push(len as u8),
        len @ 0x4c..=0xff => script.extend([OP_PUSHDATA1, len as u8]),
        len @ 0x100..=0xffff => {
            script.push(OP_PUSHDATA2);
            script.extend((len as u16).to_le_bytes());
        }
        len => {
            script.push(OP_PUSHDATA4);
            script.extend((len as u32).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// HASH160 of a compressed public key, as committed by P2PKH and P2WPKH scripts.
pub fn pubkey_hash(pk: &CompressedPk) -> [u8; 20] {
    hash160::Hash::hash(&pk.serialize()).to_byte_array()
}

/// HASH160 of a redeem script, as committed by P2SH scripts.
pub fn script_hash(script: &[u8]) -> [u8; 20] { hash160::Hash::hash(script).to_byte_array() }

/// SHA256 of a witness script, as committed by P2WSH scripts.
pub fn wscript_hash(script: &[u8]) -> [u8; 32] { sha256::Hash::hash(script).to_byte_array() }

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use bc::opcodes::{OP_DROP, OP_PUSHBYTES_32};

    use super::*;

    fn hex(s: &str) -> Vec<u8> { Vec::<u8>::from_hex(s).unwrap() }

    #[test]
    fn classify_standard() {
        let p2pkh = ScriptPubkey::p2pkh([0x11; 20]);
        assert_eq!(ScriptClass::classify(&p2pkh), ScriptClass::P2pkh);

        let p2sh = ScriptPubkey::p2sh([0x22; 20]);
        assert_eq!(ScriptClass::classify(&p2sh), ScriptClass::P2sh);

        let p2wpkh = hex("0014751e76e8199196d454941c45d1b3a323f1433bd6");
        assert_eq!(ScriptClass::classify(&p2wpkh), ScriptClass::P2wpkh);
        assert_eq!(
            ScriptClass::P2wpkh.commitment(&p2wpkh).unwrap(),
            &hex("751e76e8199196d454941c45d1b3a323f1433bd6")[..]
        );

        let p2wsh = ScriptPubkey::p2wsh([0x33; 32]);
        assert_eq!(ScriptClass::classify(&p2wsh), ScriptClass::P2wsh);

        let mut p2tr = vec![OP_PUSHNUM_1, OP_PUSHBYTES_32];
        p2tr.extend([0x44; 32]);
        assert_eq!(ScriptClass::classify(&p2tr), ScriptClass::P2tr);
    }

    #[test]
    fn classify_length_is_exact() {
        let mut almost = hex("0014751e76e8199196d454941c45d1b3a323f1433bd6");
        almost.push(0x00);
        assert_eq!(ScriptClass::classify(&almost), ScriptClass::Unknown);
        assert_eq!(ScriptClass::classify(&[]), ScriptClass::Unknown);
        assert_eq!(ScriptClass::classify(&[0x6a, 0x01, 0xff]), ScriptClass::Unknown);
    }

    #[test]
    fn nested_class_is_explicit() {
        let p2sh = ScriptPubkey::p2sh([0x22; 20]);
        let redeem = hex("0014751e76e8199196d454941c45d1b3a323f1433bd6");

        let class = SpendClass::with(&p2sh, Some(&redeem));
        assert_eq!(class, SpendClass::P2sh(ScriptClass::P2wpkh));
        assert_eq!(class.effective(), ScriptClass::P2wpkh);
        assert_eq!(class.to_string(), "p2sh(p2wpkh)");
        assert_eq!(SpendClass::with(&p2sh, None), SpendClass::P2shOpaque);
    }

    #[test]
    fn multisig_template() {
        let pk = hex("02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5");
        let mut script = vec![0x52];
        for _ in 0..3 {
            push_slice(&mut script, &pk);
        }
        script.extend([0x53, OP_CHECKMULTISIG]);
        let ms = Multisig::parse(&script).unwrap();
        assert_eq!(ms.threshold, 2);
        assert_eq!(ms.keys.len(), 3);

        let n = script.len();
        script[n - 2] = 0x54;
        assert_eq!(Multisig::parse(&script), None);
        assert_eq!(Multisig::parse(&[OP_CHECKMULTISIG]), None);
    }

    #[test]
    fn tapscript_sig_ops() {
        let mut script = vec![];
        push_slice(&mut script, &[0xaa; 32]);
        script.push(OP_CHECKSIG);
        push_slice(&mut script, &[0xbb; 32]);
        script.extend([OP_CHECKSIGADD, 0x52, 0x9c]);
        assert_eq!(count_sig_ops(&script), 2);
        assert_eq!(xonly_pushes(&script), vec![[0xaa; 32], [0xbb; 32]]);
    }

    #[test]
    fn key_hash_commitment() {
        let pk = hex("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
        let pk = CompressedPk::from_bytes(&pk[..]).unwrap();
        assert_eq!(pubkey_hash(&pk).to_vec(), hex("751e76e8199196d454941c45d1b3a323f1433bd6"));
    }

    #[test]
    fn code_separators() {
        let mut script = vec![OP_CODESEPARATOR];
        push_slice(&mut script, &[OP_CODESEPARATOR; 3]);
        script.extend([OP_CODESEPARATOR, OP_DROP, OP_CODESEPARATOR]);

        let mut expected = vec![];
        push_slice(&mut expected, &[OP_CODESEPARATOR; 3]);
        expected.push(OP_DROP);
        assert_eq!(remove_code_separators(&script), expected);

        let truncated = [OP_CODESEPARATOR, OP_PUSHDATA1, 0x10, 0x01];
        assert_eq!(remove_code_separators(&truncated), vec![OP_PUSHDATA1, 0x10, 0x01]);
    }

    #[test]
    fn truncated_push_stops() {
        let script = [OP_PUSHDATA1, 0x10, 0x01];
        assert_eq!(Instructions::new(&script).count(), 0);
    }

    #[test]
    fn minimal_pushes() {
        let mut script = vec![];
        push_slice(&mut script, &[0x01; 80]);
        assert_eq!(&script[..2], &[OP_PUSHDATA1, 80]);
        assert_eq!(script.len(), 82);
    }
}
