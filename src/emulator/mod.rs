// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software IPU: a [`ChannelProgrammer`] that executes frames on the CPU.
//!
//! It behaves like the hardware where the scheduler can observe it. A
//! processing block of a unit serves one channel at a time, a frame only
//! starts once its whole linked chain is enabled and the head's input
//! buffer is selected, and completion arrives asynchronously on the tail's
//! interrupt after a configurable latency.

pub mod raster;

use crate::{
    arbiter::Role,
    channel::{
        Blend, BufferDesc, BufferKind, ChannelId, ChannelKind, ChannelParams, ChannelProgrammer,
        Completion, CompletionSignal, CompletionToken, Stage,
    },
    error::ChannelError,
    memory::MemoryMap,
};
use raster::{Raster, Space};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};
use tracing::{debug, instrument, trace, warn};

/// Default time a frame takes.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(2);

/// One-shot failure armed with [`SoftwareIpu::inject`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    Init,
    BufferInit,
    Link,
    Unlink,
    Enable,
    Disable,
    BufferSelect,
    NoIrq,
    IrqRegistration,
    /// The next frame runs but never raises its interrupt.
    LostCompletion,
    /// The next frame reports a hardware fault.
    Execution,
}

struct Channel {
    unit: u8,
    kind: ChannelKind,
    params: ChannelParams,
    buffers: HashMap<BufferKind, BufferDesc>,
    enabled: bool,
    irq: Option<CompletionSignal>,
    prev: Option<ChannelId>,
    next: Option<ChannelId>,
}

impl Channel {
    fn block(&self) -> (u8, Stage, Role) {
        (self.unit, self.kind.stage(), self.kind.role())
    }
}

/// Snapshot of one channel of a started frame.
struct Step {
    kind: ChannelKind,
    params: ChannelParams,
    buffers: HashMap<BufferKind, BufferDesc>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    channels: BTreeMap<ChannelId, Channel>,
    busy: HashSet<(u8, Stage, Role)>,
    active: usize,
    peak: usize,
    faults: Vec<Fault>,
}

impl State {
    fn trip(&mut self, fault: Fault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(i) => {
                self.faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn chain_enabled(&self, head: ChannelId) -> bool {
        let mut cur = Some(head);
        while let Some(id) = cur {
            match self.channels.get(&id) {
                Some(ch) if ch.enabled => cur = ch.next,
                _ => return false,
            }
        }
        true
    }
}

pub struct SoftwareIpu {
    memory: Arc<MemoryMap>,
    latency: Duration,
    state: Mutex<State>,
    frames: Arc<AtomicU64>,
}

impl SoftwareIpu {
    pub fn new(memory: Arc<MemoryMap>) -> Self {
        SoftwareIpu {
            memory,
            latency: DEFAULT_LATENCY,
            state: Mutex::new(State::default()),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arms `fault` for the next operation it applies to.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Chains currently enabled.
    pub fn active_chains(&self) -> usize {
        self.lock().active
    }

    /// Most chains ever enabled at once.
    pub fn peak_chains(&self) -> usize {
        self.lock().peak
    }

    pub fn reset_peak(&self) {
        let mut state = self.lock();
        state.peak = state.active;
    }

    /// Channels currently initialised.
    pub fn channels(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn start(&self, state: &mut State, head: ChannelId) -> Result<(), ChannelError> {
        let mut steps = Vec::new();
        let mut signal = None;
        let mut cur = Some(head);
        while let Some(id) = cur {
            let Some(ch) = state.channels.get(&id) else {
                break;
            };
            steps.push(Step {
                kind: ch.kind,
                params: ch.params,
                buffers: ch.buffers.clone(),
            });
            signal = ch.irq.clone();
            cur = ch.next;
        }
        let lost = state.trip(Fault::LostCompletion);
        let fault = state.trip(Fault::Execution);

        let memory = self.memory.clone();
        let frames = self.frames.clone();
        let latency = self.latency;
        thread::Builder::new()
            .name("ipu-frame".into())
            .spawn(move || {
                thread::sleep(latency);
                let result = if fault {
                    Err("injected execution fault".to_string())
                } else {
                    steps.iter().try_for_each(|step| process(&memory, step))
                };
                frames.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = &result {
                    warn!(?head, "frame failed: {e}");
                }
                match (signal, lost) {
                    (Some(_), true) => trace!(?head, "completion swallowed"),
                    (Some(signal), false) => signal.fire(match result {
                        Ok(()) => Completion::Done,
                        Err(e) => Completion::Fault(e),
                    }),
                    (None, _) => trace!(?head, "frame done without irq"),
                }
            })
            .map_err(|e| ChannelError::BufferSelect(format!("cannot start frame: {e}")))?;
        debug!(?head, "frame started");
        Ok(())
    }
}

fn injected() -> String {
    "injected fault".into()
}

fn unknown(ch: ChannelId) -> String {
    format!("unknown channel {ch:?}")
}

impl ChannelProgrammer for SoftwareIpu {
    #[instrument(skip(self, params), level = "trace")]
    fn init_channel(
        &self,
        unit: u8,
        kind: ChannelKind,
        params: &ChannelParams,
    ) -> Result<ChannelId, ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::Init) {
            return Err(ChannelError::Init(injected()));
        }
        let block = (unit, kind.stage(), kind.role());
        if !state.busy.insert(block) {
            return Err(ChannelError::Init(format!(
                "{kind:?} of unit {unit} already in use"
            )));
        }
        state.next_id += 1;
        let id = ChannelId(state.next_id);
        state.channels.insert(
            id,
            Channel {
                unit,
                kind,
                params: *params,
                buffers: HashMap::new(),
                enabled: false,
                irq: None,
                prev: None,
                next: None,
            },
        );
        Ok(id)
    }

    fn init_buffer(
        &self,
        channel: ChannelId,
        kind: BufferKind,
        desc: &BufferDesc,
    ) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::BufferInit) {
            return Err(ChannelError::BufferInit(injected()));
        }
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| ChannelError::BufferInit(unknown(channel)))?;
        ch.buffers.insert(kind, *desc);
        Ok(())
    }

    fn link(&self, src: ChannelId, dst: ChannelId) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::Link) {
            return Err(ChannelError::Link(injected()));
        }
        if !state.channels.contains_key(&dst) {
            return Err(ChannelError::Link(unknown(dst)));
        }
        let s = state
            .channels
            .get_mut(&src)
            .ok_or_else(|| ChannelError::Link(unknown(src)))?;
        s.next = Some(dst);
        if let Some(d) = state.channels.get_mut(&dst) {
            d.prev = Some(src);
        }
        Ok(())
    }

    fn unlink(&self, src: ChannelId, dst: ChannelId) -> Result<(), ChannelError> {
        let mut state = self.lock();
        let injected_fault = state.trip(Fault::Unlink);
        if let Some(s) = state.channels.get_mut(&src) {
            s.next = None;
        }
        if let Some(d) = state.channels.get_mut(&dst) {
            d.prev = None;
        }
        if injected_fault {
            return Err(ChannelError::Unlink(injected()));
        }
        Ok(())
    }

    fn enable(&self, channel: ChannelId) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::Enable) {
            return Err(ChannelError::Enable(injected()));
        }
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| ChannelError::Enable(unknown(channel)))?;
        if ch.enabled {
            return Ok(());
        }
        ch.enabled = true;
        if ch.prev.is_none() {
            state.active += 1;
            state.peak = state.peak.max(state.active);
        }
        Ok(())
    }

    fn disable(&self, channel: ChannelId) -> Result<(), ChannelError> {
        let mut state = self.lock();
        let injected_fault = state.trip(Fault::Disable);
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| ChannelError::Disable(unknown(channel)))?;
        // The channel is stopped even when the fault is reported.
        if ch.enabled {
            ch.enabled = false;
            if ch.prev.is_none() {
                state.active -= 1;
            }
        }
        if injected_fault {
            return Err(ChannelError::Disable(injected()));
        }
        Ok(())
    }

    fn request_irq(&self, channel: ChannelId) -> Result<CompletionToken, ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::NoIrq) {
            return Err(ChannelError::NoIrq(injected()));
        }
        if state.trip(Fault::IrqRegistration) {
            return Err(ChannelError::IrqRegistration(injected()));
        }
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| ChannelError::NoIrq(unknown(channel)))?;
        if ch.irq.is_some() {
            return Err(ChannelError::IrqRegistration(format!(
                "{channel:?} irq already registered"
            )));
        }
        let (signal, token) = crate::channel::completion();
        ch.irq = Some(signal);
        Ok(token)
    }

    fn free_irq(&self, channel: ChannelId) {
        if let Some(ch) = self.lock().channels.get_mut(&channel) {
            ch.irq = None;
        }
    }

    fn select_buffer(&self, channel: ChannelId, kind: BufferKind) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.trip(Fault::BufferSelect) {
            return Err(ChannelError::BufferSelect(injected()));
        }
        let ch = state
            .channels
            .get(&channel)
            .ok_or_else(|| ChannelError::BufferSelect(unknown(channel)))?;
        if !ch.buffers.contains_key(&kind) {
            return Err(ChannelError::BufferSelect(format!(
                "{kind:?} buffer of {channel:?} not initialised"
            )));
        }
        if kind != BufferKind::Input || ch.prev.is_some() {
            return Ok(());
        }
        if !state.chain_enabled(channel) {
            return Err(ChannelError::BufferSelect(format!(
                "chain of {channel:?} not enabled"
            )));
        }
        self.start(&mut state, channel)
    }

    fn uninit_channel(&self, channel: ChannelId) {
        let mut state = self.lock();
        if let Some(ch) = state.channels.remove(&channel) {
            if ch.enabled && ch.prev.is_none() {
                state.active -= 1;
            }
            state.busy.remove(&ch.block());
        }
    }
}

fn read(memory: &MemoryMap, desc: &BufferDesc) -> Result<Raster, String> {
    let (buf, base) = memory.resolve(desc.paddr).map_err(|e| e.to_string())?;
    buf.read(|bytes| Raster::decode(bytes, base, desc))
}

fn write(memory: &MemoryMap, desc: &BufferDesc, raster: &Raster) -> Result<(), String> {
    let (buf, base) = memory.resolve(desc.paddr).map_err(|e| e.to_string())?;
    buf.write(|bytes| raster.encode(bytes, base, desc))
}

fn buffer(step: &Step, kind: BufferKind) -> Result<&BufferDesc, String> {
    step.buffers
        .get(&kind)
        .ok_or_else(|| format!("{kind:?} buffer missing"))
}

/// Runs one channel of a frame from its input buffer to its output buffer.
fn process(memory: &MemoryMap, step: &Step) -> Result<(), String> {
    let input = buffer(step, BufferKind::Input)?;
    let output = buffer(step, BufferKind::Output)?;
    let params = &step.params;
    let src = read(memory, input)?;
    let space = Space::of(output.format);

    let frame = match step.kind.stage() {
        Stage::Ic => {
            let src = match params.deinterlace {
                Some(mode) => src.deinterlace(mode),
                None => src,
            };
            let mut out = src
                .resize(
                    params.output.width,
                    params.output.height,
                    params.h_resize,
                    params.v_resize,
                )
                .into_space(space);
            if let Some(ov) = params.overlay {
                let graphics = read(memory, buffer(step, BufferKind::Graphics)?)?;
                let alpha = match ov.blend {
                    Blend::Global(a) => vec![a; graphics.px.len()],
                    Blend::Local => {
                        let desc = buffer(step, BufferKind::Alpha)?;
                        let (buf, base) =
                            memory.resolve(desc.paddr).map_err(|e| e.to_string())?;
                        buf.read(|bytes| raster::decode_alpha(bytes, base, desc))?
                    }
                };
                if graphics.px.len() != out.px.len() || alpha.len() != out.px.len() {
                    return Err("overlay window does not match output".into());
                }
                out.blend(graphics, &alpha, ov.color_key);
            }
            out.flip(params.rotation.hflip(), params.rotation.vflip());
            out
        }
        Stage::Rot => src.into_space(space).rotate(params.rotation),
    };
    write(memory, output, &frame)
}
