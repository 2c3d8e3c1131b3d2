// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Programs the channels of one stripe and tears them down again.
//!
//! A [`Pipeline`] owns every channel, link, interrupt and intermediate
//! buffer it set up. Teardown runs from [`Pipeline::disable_and_release`]
//! or, on any early return, from `Drop`, in this order: disable channels,
//! free the interrupt, unlink, uninitialise channels, free the intermediate
//! buffer.

use crate::{
    arbiter::Slot,
    channel::{
        Blend, BufferDesc, BufferKind, ChannelId, ChannelKind, ChannelParams,
        ChannelProgrammer, CompletionToken, Frame, OverlayParams,
    },
    error::TaskError,
    format::{self, GREY},
    memory::MemoryMap,
    split::{Resize, Stripe},
    task::{Alpha, Rect, Rotation, TaskId},
    validate::{Mode, ResolvedTask, Surface},
};
use tracing::{debug, error, instrument, warn};

/// Buffer window of `surface` covering `rect`, in surface coordinates.
fn window(surface: &Surface, rect: Rect) -> BufferDesc {
    let layout = format::plane_layout(
        surface.format,
        surface.width,
        surface.height,
        rect.x,
        rect.y,
    );
    BufferDesc {
        paddr: surface.paddr + layout.offset,
        width: rect.width,
        height: rect.height,
        stride: layout.stride,
        u_offset: layout.u_offset,
        v_offset: layout.v_offset,
        format: surface.format,
    }
}

fn offset(rect: Rect, origin: Rect) -> Rect {
    Rect {
        x: origin.x + rect.x,
        y: origin.y + rect.y,
        ..rect
    }
}

pub struct Pipeline<'a> {
    programmer: &'a dyn ChannelProgrammer,
    memory: &'a MemoryMap,
    task: TaskId,
    /// Channels in data flow order.
    chain: Vec<ChannelId>,
    buffers: Vec<(ChannelId, BufferKind)>,
    linked: bool,
    enabled: Vec<ChannelId>,
    irq: Option<ChannelId>,
    intermediate: Option<u64>,
    released: bool,
}

impl<'a> Pipeline<'a> {
    /// Initialises and links the channels `stripe` of `resolved` needs on
    /// the unit and role of `slot`.
    #[instrument(skip_all, fields(task = %task, unit = slot.unit, role = %slot.role))]
    pub fn configure(
        programmer: &'a dyn ChannelProgrammer,
        memory: &'a MemoryMap,
        slot: Slot,
        resolved: &ResolvedTask,
        stripe: &Stripe,
        task: TaskId,
    ) -> Result<Self, TaskError> {
        let mut pipeline = Pipeline {
            programmer,
            memory,
            task,
            chain: Vec::with_capacity(2),
            buffers: Vec::with_capacity(4),
            linked: false,
            enabled: Vec::with_capacity(2),
            irq: None,
            intermediate: None,
            released: false,
        };

        let (input, output) = (&resolved.input, &resolved.output);
        let input_desc = window(input, offset(stripe.input, input.crop));
        let convert = resolved.mode.contains(Mode::IC) || resolved.mode.contains(Mode::VDI);
        let rotate = resolved.mode.contains(Mode::ROT);

        let output_rect = if rotate {
            output.crop
        } else {
            offset(
                stripe.placement(output.crop.width, output.crop.height, resolved.rotation),
                output.crop,
            )
        };
        let output_desc = window(output, output_rect);

        let converted = if convert {
            let produced = stripe.programmed_output();
            let target = if rotate {
                pipeline.intermediate(resolved)?
            } else {
                output_desc
            };
            let params = ChannelParams {
                input: Frame {
                    width: stripe.input.width,
                    height: stripe.input.height,
                    format: input.format,
                },
                output: Frame {
                    width: produced.width,
                    height: produced.height,
                    format: output.format,
                },
                h_resize: stripe.h_resize,
                v_resize: stripe.v_resize,
                rotation: if rotate {
                    Rotation::Rotation0
                } else {
                    resolved.rotation
                },
                overlay: resolved.overlay.as_ref().map(|ov| OverlayParams {
                    format: ov.format,
                    blend: match resolved.alpha {
                        Some(Alpha::Global(a)) => Blend::Global(a),
                        _ => Blend::Local,
                    },
                    color_key: resolved.color_key,
                }),
                deinterlace: resolved.deinterlace,
            };
            let kind = ChannelKind::converter(slot.role, resolved.is_deinterlaced());
            let ch = pipeline.init(slot.unit, kind, &params)?;
            pipeline.buffer(ch, BufferKind::Input, &input_desc)?;
            pipeline.buffer(ch, BufferKind::Output, &target)?;

            if let Some(ov) = &resolved.overlay {
                let rect = offset(produced, ov.crop);
                pipeline.buffer(ch, BufferKind::Graphics, &window(ov, rect))?;
                if let Some(Alpha::Local { paddr }) = resolved.alpha {
                    let desc = BufferDesc {
                        paddr: paddr + rect.y as u64 * ov.width as u64 + rect.x as u64,
                        width: rect.width,
                        height: rect.height,
                        stride: ov.width,
                        u_offset: 0,
                        v_offset: 0,
                        format: GREY,
                    };
                    pipeline.buffer(ch, BufferKind::Alpha, &desc)?;
                }
            }
            Some((ch, target))
        } else {
            None
        };

        if rotate {
            let (source, source_desc) = match &converted {
                Some((ch, desc)) => (Some(*ch), *desc),
                None => (None, input_desc),
            };
            let params = ChannelParams {
                input: Frame {
                    width: resolved.ic_width,
                    height: resolved.ic_height,
                    format: output.format,
                },
                output: Frame {
                    width: output.crop.width,
                    height: output.crop.height,
                    format: output.format,
                },
                h_resize: Resize::new(1, 1),
                v_resize: Resize::new(1, 1),
                rotation: resolved.rotation,
                overlay: None,
                deinterlace: None,
            };
            let ch = pipeline.init(slot.unit, ChannelKind::rotator(slot.role), &params)?;
            pipeline.buffer(ch, BufferKind::Input, &source_desc)?;
            pipeline.buffer(ch, BufferKind::Output, &output_desc)?;
            if let Some(src) = source {
                programmer.link(src, ch).inspect_err(|e| error!(%task, "{e}"))?;
                pipeline.linked = true;
            }
        }

        debug!(%task, chain = ?pipeline.chain, "channels configured");
        Ok(pipeline)
    }

    fn init(
        &mut self,
        unit: u8,
        kind: ChannelKind,
        params: &ChannelParams,
    ) -> Result<ChannelId, TaskError> {
        let ch = self
            .programmer
            .init_channel(unit, kind, params)
            .inspect_err(|e| error!(task = %self.task, ?kind, "{e}"))?;
        self.chain.push(ch);
        Ok(ch)
    }

    fn buffer(
        &mut self,
        ch: ChannelId,
        kind: BufferKind,
        desc: &BufferDesc,
    ) -> Result<(), TaskError> {
        self.programmer
            .init_buffer(ch, kind, desc)
            .inspect_err(|e| error!(task = %self.task, ?ch, ?kind, "{e}"))?;
        self.buffers.push((ch, kind));
        Ok(())
    }

    /// Allocates the buffer between the converter and the rotator.
    fn intermediate(&mut self, resolved: &ResolvedTask) -> Result<BufferDesc, TaskError> {
        let (w, h, fmt) = (resolved.ic_width, resolved.ic_height, resolved.output.format);
        let buf = self
            .memory
            .allocate(format::frame_size(fmt, w, h))
            .map_err(|e| {
                error!(task = %self.task, "intermediate buffer: {e}");
                TaskError::OutOfMemory
            })?;
        self.intermediate = Some(buf.paddr());
        let layout = format::plane_layout(fmt, w, h, 0, 0);
        Ok(BufferDesc {
            paddr: buf.paddr(),
            width: w,
            height: h,
            stride: layout.stride,
            u_offset: layout.u_offset,
            v_offset: layout.v_offset,
            format: fmt,
        })
    }

    /// Registers for the end-of-frame interrupt of the last channel.
    pub fn register_completion(&mut self) -> Result<CompletionToken, TaskError> {
        let tail = *self
            .chain
            .last()
            .ok_or_else(|| TaskError::Generic("no channel configured".into()))?;
        let token = self
            .programmer
            .request_irq(tail)
            .inspect_err(|e| error!(task = %self.task, "{e}"))?;
        self.irq = Some(tail);
        Ok(token)
    }

    /// Enables the chain from the tail and marks its buffers ready. The
    /// input buffer of the head channel is selected last and starts the
    /// frame.
    pub fn enable(&mut self) -> Result<(), TaskError> {
        for &ch in self.chain.iter().rev() {
            self.programmer
                .enable(ch)
                .inspect_err(|e| error!(task = %self.task, ?ch, "{e}"))?;
            self.enabled.push(ch);
        }

        let head = self.chain.first().copied();
        let (start, ready): (Vec<_>, Vec<_>) = self
            .buffers
            .iter()
            .copied()
            .partition(|&(ch, kind)| Some(ch) == head && kind == BufferKind::Input);
        for (ch, kind) in ready.into_iter().chain(start) {
            self.programmer
                .select_buffer(ch, kind)
                .inspect_err(|e| error!(task = %self.task, ?ch, ?kind, "{e}"))?;
        }
        Ok(())
    }

    /// Tears the pipeline down. Every step runs even when an earlier one
    /// failed; the first failure is returned.
    pub fn disable_and_release(mut self) -> Result<(), TaskError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), TaskError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut failure: Option<TaskError> = None;

        for ch in self.enabled.drain(..).rev() {
            if let Err(e) = self.programmer.disable(ch) {
                warn!(task = %self.task, ?ch, "{e}");
                failure.get_or_insert(e.into());
            }
        }
        if let Some(ch) = self.irq.take() {
            self.programmer.free_irq(ch);
        }
        if self.linked {
            if let Err(e) = self.programmer.unlink(self.chain[0], self.chain[1]) {
                warn!(task = %self.task, "{e}");
                failure.get_or_insert(e.into());
            }
        }
        for ch in self.chain.drain(..).rev() {
            self.programmer.uninit_channel(ch);
        }
        if let Some(paddr) = self.intermediate.take() {
            if let Err(e) = self.memory.free(paddr) {
                warn!(task = %self.task, "intermediate buffer: {e}");
            }
        }
        debug!(task = %self.task, "channels released");
        failure.map_or(Ok(()), Err)
    }
}

impl Drop for Pipeline<'_> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
