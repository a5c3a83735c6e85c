// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod assemble;
mod routes;
mod state;
mod stream;

pub use assemble::assemble_group;
pub use routes::router;
pub use state::AppState;
pub use stream::{encode_frame, frame_stream, STREAM_READ_TIMEOUT};
