// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Boundary to the channel programmer, the register-level driver of the IPU
//! blocks.
//!
//! The scheduler never touches registers. It describes each hardware
//! channel with [`ChannelParams`] and its memory with [`BufferDesc`] and
//! drives the [`ChannelProgrammer`] step by step; each step has its own
//! failure kind. Hardware completion is delivered through a one-shot
//! [`CompletionToken`].

use crate::{
    arbiter::Role,
    error::ChannelError,
    format::FourCC,
    split::Resize,
    task::{Deinterlace, Rotation},
};
use core::fmt;
use kanal::ReceiveErrorTimeout;
use std::time::Duration;

/// Handle of an initialised channel.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Processing block a logical channel runs on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Image converter, fed either directly or through the deinterlacer.
    Ic,
    Rot,
}

/// Logical channels of one IPU unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    IcViewfinder,
    IcPostProcessor,
    /// Deinterlacer feeding the viewfinder converter.
    Vdi,
    RotViewfinder,
    RotPostProcessor,
}

impl ChannelKind {
    pub fn role(self) -> Role {
        match self {
            ChannelKind::IcViewfinder | ChannelKind::Vdi | ChannelKind::RotViewfinder => {
                Role::GeneralPurpose
            }
            ChannelKind::IcPostProcessor | ChannelKind::RotPostProcessor => Role::Secondary,
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            ChannelKind::RotViewfinder | ChannelKind::RotPostProcessor => Stage::Rot,
            _ => Stage::Ic,
        }
    }

    /// Converter channel of `role`, or the deinterlacer.
    pub fn converter(role: Role, deinterlace: bool) -> Self {
        match (role, deinterlace) {
            (_, true) => ChannelKind::Vdi,
            (Role::GeneralPurpose, false) => ChannelKind::IcViewfinder,
            (Role::Secondary, false) => ChannelKind::IcPostProcessor,
        }
    }

    pub fn rotator(role: Role) -> Self {
        match role {
            Role::GeneralPurpose => ChannelKind::RotViewfinder,
            Role::Secondary => ChannelKind::RotPostProcessor,
        }
    }
}

/// Memory ports of a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Input,
    Output,
    /// Overlay plane composed by the converter.
    Graphics,
    /// Per-pixel alpha plane of the overlay.
    Alpha,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Blend {
    Global(u8),
    /// Weights come from the alpha buffer.
    Local,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OverlayParams {
    pub format: FourCC,
    pub blend: Blend,
    pub color_key: Option<u32>,
}

/// Geometry and processing of one channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelParams {
    pub input: Frame,
    pub output: Frame,
    pub h_resize: Resize,
    pub v_resize: Resize,
    /// Flips for converter channels, the full mode for rotator channels.
    pub rotation: Rotation,
    pub overlay: Option<OverlayParams>,
    pub deinterlace: Option<Deinterlace>,
}

/// Memory window of a buffer port.
///
/// `paddr` is the bus address of the first luma (or packed) byte of the
/// window; chroma offsets are relative to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub paddr: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub u_offset: u64,
    pub v_offset: u64,
    pub format: FourCC,
}

/// What the hardware reported for a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Done,
    Fault(String),
}

/// Interrupt side of a completion: fired once when the frame finishes.
#[derive(Clone)]
pub struct CompletionSignal(kanal::Sender<Completion>);

impl CompletionSignal {
    pub fn fire(&self, completion: Completion) {
        // The waiter may have timed out and gone.
        let _ = self.0.try_send(completion);
    }
}

/// Waiting side of a completion.
pub struct CompletionToken(kanal::Receiver<Completion>);

impl CompletionToken {
    /// Blocks until completion or until `timeout` elapses, returning `None`
    /// on timeout.
    pub fn wait(&self, timeout: Duration) -> Option<Completion> {
        match self.0.recv_timeout(timeout) {
            Ok(c) => Some(c),
            Err(ReceiveErrorTimeout::Timeout) => None,
            Err(_) => Some(Completion::Fault("interrupt source released".into())),
        }
    }
}

/// Creates a connected signal/token pair.
pub fn completion() -> (CompletionSignal, CompletionToken) {
    let (tx, rx) = kanal::bounded(1);
    (CompletionSignal(tx), CompletionToken(rx))
}

/// Register-level driver of the IPU channels.
pub trait ChannelProgrammer: Send + Sync {
    fn init_channel(
        &self,
        unit: u8,
        kind: ChannelKind,
        params: &ChannelParams,
    ) -> Result<ChannelId, ChannelError>;

    fn init_buffer(
        &self,
        channel: ChannelId,
        kind: BufferKind,
        desc: &BufferDesc,
    ) -> Result<(), ChannelError>;

    /// Feeds the output of `src` into `dst`; the pair then runs as one frame.
    fn link(&self, src: ChannelId, dst: ChannelId) -> Result<(), ChannelError>;

    fn unlink(&self, src: ChannelId, dst: ChannelId) -> Result<(), ChannelError>;

    fn enable(&self, channel: ChannelId) -> Result<(), ChannelError>;

    fn disable(&self, channel: ChannelId) -> Result<(), ChannelError>;

    /// Registers for the end-of-frame interrupt of `channel`.
    fn request_irq(&self, channel: ChannelId) -> Result<CompletionToken, ChannelError>;

    fn free_irq(&self, channel: ChannelId);

    /// Marks a buffer ready. Selecting the input buffer of the head of an
    /// enabled chain starts the frame.
    fn select_buffer(&self, channel: ChannelId, kind: BufferKind) -> Result<(), ChannelError>;

    fn uninit_channel(&self, channel: ChannelId);
}
