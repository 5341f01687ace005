//! wgpu implementation of the resource binding layer.
//!
//! Shaders are compute pipelines registered by id. Every pipeline follows one
//! bind group layout at group 0:
//! - binding 0: uniform buffer holding the ordered uniform values as `f32`s
//! - bindings 1..=n: input textures (array view for multi-layer inputs)
//! - binding n+1: output storage texture
//!
//! Pipelines dispatch 8x8 workgroups over the output resolution.

use crate::binding::{BlitRegion, CommandBufferId, ResourceBinding, ShaderCall, SubmissionId};
use crate::context::GpuContext;
use crate::error::BindingError;
use crate::texture::{TextureDesc, TextureHandle, TextureUsage};
use parking_lot::Mutex;
use pixgraph_core::{PixelBuffer, PixelFormat};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

const WORKGROUP_SIZE: u32 = 8;

struct GpuTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
}

impl GpuTexture {
    fn view(&self) -> wgpu::TextureView {
        let dimension = if self.desc.layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        })
    }

    fn copy_info(&self, layer: u32) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        }
    }
}

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    /// Texture inputs the layout declares; `None` binds every input given.
    inputs: Option<usize>,
}

struct Submission {
    index: wgpu::SubmissionIndex,
    done: Arc<AtomicBool>,
}

/// `ResourceBinding` backed by a wgpu device and queue.
pub struct WgpuBinding {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_texture: u64,
    encoders: HashMap<CommandBufferId, wgpu::CommandEncoder>,
    next_command_buffer: u64,
    pipelines: HashMap<String, Kernel>,
    submissions: HashMap<SubmissionId, Submission>,
    next_submission: u64,
}

pub(crate) fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
    }
}

fn texture_usages(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

impl WgpuBinding {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            textures: HashMap::new(),
            next_texture: 1,
            encoders: HashMap::new(),
            next_command_buffer: 1,
            pipelines: HashMap::new(),
            submissions: HashMap::new(),
            next_submission: 1,
        }
    }

    /// Register a compiled compute pipeline under a shader id.
    pub fn register_pipeline(&mut self, shader: impl Into<String>, pipeline: wgpu::ComputePipeline) {
        self.pipelines.insert(
            shader.into(),
            Kernel {
                pipeline,
                inputs: None,
            },
        );
    }

    /// Compile WGSL and register it with an automatically derived layout.
    ///
    /// `inputs` is the number of input textures the kernel declares. Calls
    /// with more inputs bind only the first `inputs`, so a kernel that never
    /// reads an optional feedback input ignores it.
    pub fn register_wgsl(
        &mut self,
        shader: impl Into<String>,
        source: &str,
        entry_point: &str,
        inputs: usize,
    ) -> Result<(), BindingError> {
        let shader = shader.into();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&shader),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&shader),
                layout: None,
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BindingError::ShaderNotFound(format!("{shader}: {err}")));
        }
        info!(shader = %shader, inputs, "Registered compute pipeline");
        self.pipelines.insert(
            shader,
            Kernel {
                pipeline,
                inputs: Some(inputs),
            },
        );
        Ok(())
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture, BindingError> {
        self.textures
            .get(&handle)
            .ok_or(BindingError::UnknownTexture(handle))
    }

    fn mark_finished(&mut self, submission: SubmissionId) {
        if let Some(s) = self.submissions.get(&submission) {
            s.done.store(true, Ordering::Release);
        }
    }
}

impl ResourceBinding for WgpuBinding {
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BindingError> {
        if desc.resolution.is_empty() || desc.layers == 0 {
            return Err(BindingError::Allocation(format!(
                "zero-sized texture {} x {}",
                desc.resolution, desc.layers
            )));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("PixGraph Texture"),
            size: wgpu::Extent3d {
                width: desc.resolution.width,
                height: desc.resolution.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: texture_usages(desc.usage),
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BindingError::Allocation(err.to_string()));
        }

        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(handle, GpuTexture { texture, desc: *desc });
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures.remove(&handle) {
            entry.texture.destroy();
        }
    }

    fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&handle).map(|t| t.desc)
    }

    fn make_command_buffer(&mut self) -> Result<CommandBufferId, BindingError> {
        let id = CommandBufferId(self.next_command_buffer);
        self.next_command_buffer += 1;
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("PixGraph Tick"),
            });
        self.encoders.insert(id, encoder);
        Ok(id)
    }

    fn blit(
        &mut self,
        command_buffer: CommandBufferId,
        src: TextureHandle,
        dst: TextureHandle,
        region: BlitRegion,
    ) -> Result<(), BindingError> {
        let source = self
            .textures
            .get(&src)
            .ok_or(BindingError::UnknownTexture(src))?;
        let target = self
            .textures
            .get(&dst)
            .ok_or(BindingError::UnknownTexture(dst))?;
        if source.desc.format != target.desc.format {
            return Err(BindingError::Blit(format!(
                "format mismatch {:?} -> {:?}",
                source.desc.format, target.desc.format
            )));
        }
        let encoder = self
            .encoders
            .get_mut(&command_buffer)
            .ok_or(BindingError::UnknownCommandBuffer(command_buffer))?;
        encoder.copy_texture_to_texture(
            source.copy_info(region.src_layer),
            target.copy_info(region.dst_layer),
            wgpu::Extent3d {
                width: region.size.width,
                height: region.size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn upload(&mut self, dst: TextureHandle, pixels: &PixelBuffer) -> Result<(), BindingError> {
        let target = self.texture(dst)?;
        let desc = target.desc;
        if desc.resolution != pixels.resolution || desc.layers != pixels.layers {
            return Err(BindingError::Upload(format!(
                "buffer {} x {} does not match texture {} x {}",
                pixels.resolution, pixels.layers, desc.resolution, desc.layers
            )));
        }
        pixels
            .validate()
            .map_err(|e| BindingError::Upload(e.to_string()))?;

        let converted;
        let data = if pixels.format == desc.format {
            &pixels.data
        } else {
            let rgba = pixels
                .to_rgba_f32()
                .map_err(|e| BindingError::Upload(e.to_string()))?;
            converted = PixelBuffer::from_rgba_f32(desc.resolution, desc.layers, desc.format, &rgba)
                .map_err(|e| BindingError::Upload(e.to_string()))?;
            &converted.data
        };

        self.queue.write_texture(
            target.copy_info(0),
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(desc.resolution.width * desc.format.bytes_per_pixel() as u32),
                rows_per_image: Some(desc.resolution.height),
            },
            wgpu::Extent3d {
                width: desc.resolution.width,
                height: desc.resolution.height,
                depth_or_array_layers: desc.layers,
            },
        );
        Ok(())
    }

    fn dispatch_shader(
        &mut self,
        command_buffer: CommandBufferId,
        call: &ShaderCall<'_>,
    ) -> Result<(), BindingError> {
        let kernel = self
            .pipelines
            .get(call.shader)
            .ok_or_else(|| BindingError::ShaderNotFound(call.shader.to_string()))?;
        if !self.encoders.contains_key(&command_buffer) {
            return Err(BindingError::UnknownCommandBuffer(command_buffer));
        }
        let output = self.texture(call.output)?;
        if !output.desc.usage.contains(TextureUsage::STORAGE) {
            return Err(BindingError::Dispatch(format!(
                "output {:?} is not a storage texture",
                call.output
            )));
        }
        let inputs = match kernel.inputs {
            Some(n) if call.inputs.len() < n => {
                return Err(BindingError::Dispatch(format!(
                    "{} expects {n} input(s), got {}",
                    call.shader,
                    call.inputs.len()
                )));
            }
            Some(n) => &call.inputs[..n],
            None => call.inputs,
        };

        // Uniform buffers are 16-byte aligned and never empty.
        let mut uniforms = call.uniforms.to_vec();
        uniforms.resize(call.uniforms.len().div_ceil(4).max(1) * 4, 0.0);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(call.shader),
                contents: bytemuck::cast_slice(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let input_views = inputs
            .iter()
            .map(|h| self.texture(*h).map(GpuTexture::view))
            .collect::<Result<Vec<_>, _>>()?;
        let output_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let resolution = output.desc.resolution;

        let mut entries = Vec::with_capacity(input_views.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        });
        for (i, view) in input_views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: input_views.len() as u32 + 1,
            resource: wgpu::BindingResource::TextureView(&output_view),
        });

        // The bind group is validated before anything touches the shared encoder.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.shader),
            layout: &kernel.pipeline.get_bind_group_layout(0),
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BindingError::Dispatch(format!("{}: {err}", call.shader)));
        }

        let encoder = self
            .encoders
            .get_mut(&command_buffer)
            .ok_or(BindingError::UnknownCommandBuffer(command_buffer))?;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(call.shader),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            resolution.width.div_ceil(WORKGROUP_SIZE),
            resolution.height.div_ceil(WORKGROUP_SIZE),
            1,
        );
        Ok(())
    }

    fn commit(&mut self, command_buffer: CommandBufferId) -> Result<SubmissionId, BindingError> {
        let encoder = self
            .encoders
            .remove(&command_buffer)
            .ok_or(BindingError::UnknownCommandBuffer(command_buffer))?;
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        self.queue
            .on_submitted_work_done(move || flag.store(true, Ordering::Release));

        let id = SubmissionId(self.next_submission);
        self.next_submission += 1;
        self.submissions.insert(id, Submission { index, done });
        debug!(submission = id.0, "wgpu submission");
        Ok(id)
    }

    fn discard(&mut self, command_buffer: CommandBufferId) {
        self.encoders.remove(&command_buffer);
    }

    fn poll(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        // Finished submissions are forgotten; `is_complete` treats older ids as done.
        self.submissions.retain(|_, s| !s.done.load(Ordering::Acquire));
    }

    fn is_complete(&self, submission: SubmissionId) -> bool {
        match self.submissions.get(&submission) {
            Some(s) => s.done.load(Ordering::Acquire),
            None => submission.0 < self.next_submission,
        }
    }

    fn wait(&mut self, submission: SubmissionId) -> Result<(), BindingError> {
        let Some(entry) = self.submissions.get(&submission) else {
            if submission.0 < self.next_submission {
                return Ok(());
            }
            return Err(BindingError::UnknownSubmission(submission));
        };
        let _ = self
            .device
            .poll(wgpu::Maintain::wait_for(entry.index.clone()));
        self.mark_finished(submission);
        Ok(())
    }

    fn read_pixels(&mut self, handle: TextureHandle) -> Result<PixelBuffer, BindingError> {
        let source = self.texture(handle)?;
        let desc = source.desc;
        let unpadded = desc.resolution.width * desc.format.bytes_per_pixel() as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let rows = desc.resolution.height * desc.layers;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("PixGraph Readback"),
            size: padded as u64 * rows as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("PixGraph Readback"),
            });
        encoder.copy_texture_to_buffer(
            source.copy_info(0),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(desc.resolution.height),
                },
            },
            wgpu::Extent3d {
                width: desc.resolution.width,
                height: desc.resolution.height,
                depth_or_array_layers: desc.layers,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let mapped = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&mapped);
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            *slot.lock() = Some(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match mapped.lock().take() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(BindingError::Readback(e.to_string())),
            None => return Err(BindingError::Readback("buffer was never mapped".into())),
        }

        let mut data = Vec::with_capacity((unpadded * rows) as usize);
        {
            let view = slice.get_mapped_range();
            for row in view.chunks(padded as usize) {
                data.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        // Everything submitted before the readback has finished too.
        for s in self.submissions.values() {
            s.done.store(true, Ordering::Release);
        }

        Ok(PixelBuffer {
            resolution: desc.resolution,
            layers: desc.layers,
            format: desc.format,
            data,
        })
    }
}
