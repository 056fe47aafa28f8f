// refgraph - A reflection-based binary object graph serializer.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io;
use thiserror::Error;

/// Result type for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported stream version: 0x{0:04x}")]
    UnsupportedVersion(u32),

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("invalid UTF-8 string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("varuint overflowed while decoding")]
    VarintOverflow,

    #[error("attempted to register id {0}, which is already bound")]
    IdReuse(u64),

    #[error("collection at id {id} reported count {reported} but iterated {actual}")]
    CountMismatch {
        id: u64,
        reported: usize,
        actual: usize,
    },

    #[error("array rank mismatch: declared {declared}, value has {actual}")]
    ArrayRankMismatch { declared: u32, actual: u32 },

    #[error("type '{0}' could not be constructed")]
    ConstructionFailed(String),

    #[error("unknown settings bit {0} is not a reserved no-op")]
    UnknownSettingsBit(u32),

    #[error("{0}")]
    Custom(String),
}
