// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The synchronization core: upload handshakes, optimistic inserts, sprite materialization, and
//! the engine loop that owns them.

pub use deferred::DeferredQueue;
pub use engine::{DroppedFile, EngineCommand, EngineHandle, SyncEngine};
pub use materializer::{SpriteMaterializer, UpdateKind, UpdateState, needs_full_recreation};
pub use optimistic::OptimisticTracker;
pub use render::{GridSpec, IncrementalOp, LightSpec, RenderEngine};
pub use storage::{HttpStorage, StorageClient};
pub use uploads::{
    DownloadStep, PendingUpload, TransferRequest, UploadCoordinator, UploadOutcome, UploadState,
    UploadStep,
};

mod deferred;
mod engine;
mod materializer;
mod optimistic;
mod render;
mod storage;
pub mod testing;
mod uploads;
