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

//! Binary form of taproot script-path control blocks.
//!
//! The control block type itself comes from `bc`; its consensus encoder combines the leaf
//! version with the parity bit using AND, which drops the parity, so the bytes are produced
//! here.

use amplify::ByteArray;
use bc::{
    ControlBlock, InternalPk, InvalidLeafVer, LeafVer, Parity, TapBranchHash, TapMerklePath,
    TAPROOT_LEAF_MASK,
};

const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
const TAPROOT_CONTROL_MAX_NODES: usize = 128;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum InvalidControlBlock {
    /// taproot control block of {0} bytes; it must be 33 bytes long, optionally followed by up
    /// to 128 merkle nodes of 32 bytes each.
    Length(usize),

    /// taproot control block contains invalid internal key.
    InternalKey,

    #[from]
    #[display(inner)]
    LeafVersion(InvalidLeafVer),
}

pub(crate) fn parse_control_block(data: &[u8]) -> Result<ControlBlock, InvalidControlBlock> {
    let len = data.len();
    if len < TAPROOT_CONTROL_BASE_SIZE
        || (len - TAPROOT_CONTROL_BASE_SIZE) % TAPROOT_CONTROL_NODE_SIZE != 0
        || (len - TAPROOT_CONTROL_BASE_SIZE) / TAPROOT_CONTROL_NODE_SIZE
            > TAPROOT_CONTROL_MAX_NODES
    {
        return Err(InvalidControlBlock::Length(len));
    }

    let header = data[0];
    let leaf_version = LeafVer::from_consensus_u8(header & TAPROOT_LEAF_MASK)?;
    let output_key_parity = if header & 0x01 == 0x01 { Parity::Odd } else { Parity::Even };

    let mut internal_pk = [0u8; 32];
    internal_pk.copy_from_slice(&data[1..TAPROOT_CONTROL_BASE_SIZE]);
    let internal_pk =
        InternalPk::from_byte_array(internal_pk).map_err(|_| InvalidControlBlock::InternalKey)?;

    let merkle_branch = data[TAPROOT_CONTROL_BASE_SIZE..]
        .chunks_exact(TAPROOT_CONTROL_NODE_SIZE)
        .map(TapBranchHash::from_slice_unsafe);
    let merkle_branch =
        TapMerklePath::try_from_iter(merkle_branch).map_err(|_| InvalidControlBlock::Length(len))?;

    Ok(ControlBlock::with(leaf_version, internal_pk, output_key_parity, merkle_branch))
}

pub(crate) fn control_block_len(cb: &ControlBlock) -> usize {
    TAPROOT_CONTROL_BASE_SIZE + cb.merkle_branch.len() * TAPROOT_CONTROL_NODE_SIZE
}

pub(crate) fn serialize_control_block(cb: &ControlBlock) -> Vec<u8> {
    let mut data = Vec::with_capacity(control_block_len(cb));
    data.push(cb.leaf_version.to_consensus_u8() | cb.output_key_parity.to_consensus_u8());
    data.extend_from_slice(&cb.internal_pk.to_byte_array());
    for node in &cb.merkle_branch {
        data.extend_from_slice(&node.to_byte_array());
    }
    data
}

#[cfg(test)]
mod test {
    use super::*;

    // x-coordinate of the secp256k1 generator point
    const INTERNAL_KEY: [u8; 32] = [
        0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87, 0x0b,
        0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b, 0x16, 0xf8,
        0x17, 0x98,
    ];

    fn block(header: u8, nodes: usize) -> Vec<u8> {
        let mut data = vec![header];
        data.extend(INTERNAL_KEY);
        for no in 0..nodes {
            data.extend([no as u8 + 1; 32]);
        }
        data
    }

    #[test]
    fn key_only_block() {
        let cb = parse_control_block(&block(0xc1, 0)).unwrap();
        assert_eq!(cb.leaf_version, LeafVer::TapScript);
        assert_eq!(cb.output_key_parity, Parity::Odd);
        assert!(cb.merkle_branch.is_empty());
        assert_eq!(cb.internal_pk.to_byte_array(), INTERNAL_KEY);
        assert_eq!(serialize_control_block(&cb), block(0xc1, 0));
    }

    #[test]
    fn single_branch() {
        let cb = parse_control_block(&block(0xc0, 1)).unwrap();
        assert_eq!(cb.output_key_parity, Parity::Even);
        assert_eq!(cb.merkle_branch.len(), 1);
        assert_eq!(cb.merkle_branch[0].to_byte_array(), [1u8; 32]);
        assert_eq!(control_block_len(&cb), 65);
        assert_eq!(serialize_control_block(&cb), block(0xc0, 1));
    }

    #[test]
    fn future_leaf_version() {
        let cb = parse_control_block(&block(0xc3, 0)).unwrap();
        assert_ne!(cb.leaf_version, LeafVer::TapScript);
        assert_eq!(cb.leaf_version.to_consensus_u8(), 0xc2);
        assert_eq!(serialize_control_block(&cb), block(0xc3, 0));
        assert!(matches!(
            parse_control_block(&block(0x51, 0)),
            Err(InvalidControlBlock::LeafVersion(_))
        ));
    }

    #[test]
    fn invalid_lengths() {
        let data = block(0xc0, 129);
        for len in [0usize, 1, 32, 34, 64, 66, 98, data.len()] {
            assert_eq!(parse_control_block(&data[..len]), Err(InvalidControlBlock::Length(len)));
        }
        assert!(parse_control_block(&data[..33 + 32 * 128]).is_ok());
    }

    #[test]
    fn invalid_internal_key() {
        let mut data = block(0xc0, 0);
        data[1..33].copy_from_slice(&[0xff; 32]);
        assert_eq!(parse_control_block(&data), Err(InvalidControlBlock::InternalKey));
    }
}
