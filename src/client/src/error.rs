// Copyright 2024 The read-until Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected at construction; the client is never built.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The offending call fails; the session continues.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Single pop on an empty cache.
    #[error("cache is empty")]
    EmptyCache,

    /// Transport failure; ends the session.
    #[error("stream broken: {0}")]
    Stream(String),
}

impl From<tonic::Status> for Error {
    fn from(s: tonic::Status) -> Self {
        match s.code() {
            tonic::Code::InvalidArgument => Error::InvalidArgument(s.message().into()),
            _ => Error::Stream(s.to_string()),
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Stream(e.to_string())
    }
}
