//! Deferred CPU reference backend.
//!
//! Records commands per command buffer and executes them in submission order,
//! either at commit time or, with deferred completion, only once the
//! submission is waited on. Shaders are CPU kernels registered by id.

use crate::binding::{BlitRegion, CommandBufferId, ResourceBinding, ShaderCall, SubmissionId};
use crate::error::BindingError;
use crate::texture::{TextureDesc, TextureHandle, TextureUsage};
use pixgraph_core::PixelBuffer;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Texture storage: normalized RGBA floats, layer after layer.
#[derive(Debug, Clone)]
pub struct CpuImage {
    pub desc: TextureDesc,
    pub pixels: Vec<f32>,
}

impl CpuImage {
    fn zeroed(desc: TextureDesc) -> Self {
        let len = desc.resolution.pixel_count() * desc.layers as usize * 4;
        Self {
            desc,
            pixels: vec![0.0; len],
        }
    }

    fn offset(&self, x: u32, y: u32, layer: u32) -> usize {
        let res = self.desc.resolution;
        (layer as usize * res.pixel_count() + y as usize * res.width as usize + x as usize) * 4
    }

    /// Read a pixel with edge clamping.
    pub fn sample(&self, x: i64, y: i64, layer: u32) -> [f32; 4] {
        let res = self.desc.resolution;
        let x = x.clamp(0, res.width as i64 - 1) as u32;
        let y = y.clamp(0, res.height as i64 - 1) as u32;
        let layer = layer.min(self.desc.layers.saturating_sub(1));
        let i = self.offset(x, y, layer);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Sample at normalized coordinates of another resolution.
    pub fn sample_uv(&self, u: f32, v: f32, layer: u32) -> [f32; 4] {
        let res = self.desc.resolution;
        let x = (u * res.width as f32).floor() as i64;
        let y = (v * res.height as f32).floor() as i64;
        self.sample(x, y, layer)
    }
}

/// Kernel arguments: ordered uniforms, input images, output descriptor.
pub struct KernelArgs<'a> {
    pub uniforms: &'a [f32],
    pub inputs: &'a [&'a CpuImage],
    pub output: TextureDesc,
}

/// A CPU stand-in for a compiled shader. Returns the full output pixel array.
pub type CpuKernel = Box<dyn Fn(&KernelArgs<'_>) -> Result<Vec<f32>, String> + Send + Sync>;

#[derive(Debug, Clone)]
enum Command {
    Blit {
        src: TextureHandle,
        dst: TextureHandle,
        region: BlitRegion,
    },
    Dispatch {
        shader: String,
        uniforms: Vec<f32>,
        inputs: Vec<TextureHandle>,
        output: TextureHandle,
    },
}

/// Counters for assertions about backend traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub allocations: usize,
    pub releases: usize,
    pub command_buffers: usize,
    pub blits: usize,
    pub dispatches: usize,
    pub uploads: usize,
    pub commits: usize,
}

/// CPU implementation of `ResourceBinding`.
pub struct CpuBinding {
    textures: HashMap<TextureHandle, CpuImage>,
    next_texture: u64,
    recording: HashMap<CommandBufferId, Vec<Command>>,
    next_command_buffer: u64,
    queued: VecDeque<(SubmissionId, Vec<Command>)>,
    next_submission: u64,
    completed_through: u64,
    kernels: HashMap<String, CpuKernel>,
    deferred_completion: bool,
    fail_command_buffers: bool,
    fail_commits: bool,
    max_textures: Option<usize>,
    execution_errors: Vec<String>,
    stats: CpuStats,
}

impl Default for CpuBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBinding {
    /// Create an empty backend with no kernels registered.
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_texture: 1,
            recording: HashMap::new(),
            next_command_buffer: 1,
            queued: VecDeque::new(),
            next_submission: 1,
            completed_through: 0,
            kernels: HashMap::new(),
            deferred_completion: false,
            fail_command_buffers: false,
            fail_commits: false,
            max_textures: None,
            execution_errors: Vec::new(),
            stats: CpuStats::default(),
        }
    }

    /// Keep submissions in flight until they are waited on.
    pub fn with_deferred_completion(mut self, deferred: bool) -> Self {
        self.deferred_completion = deferred;
        self
    }

    /// Fail allocations once this many textures are alive.
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.max_textures = Some(limit);
        self
    }

    pub fn register_kernel(&mut self, shader: impl Into<String>, kernel: CpuKernel) {
        self.kernels.insert(shader.into(), kernel);
    }

    pub fn has_kernel(&self, shader: &str) -> bool {
        self.kernels.contains_key(shader)
    }

    /// Make `make_command_buffer` fail, simulating a lost device.
    pub fn set_fail_command_buffers(&mut self, fail: bool) {
        self.fail_command_buffers = fail;
    }

    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    pub fn set_texture_limit(&mut self, limit: Option<usize>) {
        self.max_textures = limit;
    }

    /// Execute every queued submission.
    pub fn complete_all(&mut self) {
        while let Some((id, commands)) = self.queued.pop_front() {
            self.execute(commands);
            self.completed_through = id.0;
        }
    }

    pub fn stats(&self) -> CpuStats {
        self.stats
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Kernel failures observed while executing submitted work.
    pub fn execution_errors(&self) -> &[String] {
        &self.execution_errors
    }

    pub fn image(&self, handle: TextureHandle) -> Option<&CpuImage> {
        self.textures.get(&handle)
    }

    fn image_or_err(&self, handle: TextureHandle) -> Result<&CpuImage, BindingError> {
        self.textures
            .get(&handle)
            .ok_or(BindingError::UnknownTexture(handle))
    }

    fn recording_mut(
        &mut self,
        command_buffer: CommandBufferId,
    ) -> Result<&mut Vec<Command>, BindingError> {
        self.recording
            .get_mut(&command_buffer)
            .ok_or(BindingError::UnknownCommandBuffer(command_buffer))
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            let result = match command {
                Command::Blit { src, dst, region } => self.execute_blit(src, dst, region),
                Command::Dispatch {
                    shader,
                    uniforms,
                    inputs,
                    output,
                } => self.execute_dispatch(&shader, &uniforms, &inputs, output),
            };
            if let Err(message) = result {
                warn!(error = %message, "CPU command failed during execution");
                self.execution_errors.push(message);
            }
        }
    }

    fn execute_blit(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        region: BlitRegion,
    ) -> Result<(), String> {
        let source = self
            .textures
            .get(&src)
            .ok_or_else(|| format!("blit source {src:?} released before execution"))?;
        let mut rows = Vec::with_capacity(region.size.height as usize);
        for y in 0..region.size.height {
            let start = source.offset(0, y, region.src_layer);
            let end = start + region.size.width as usize * 4;
            rows.push(source.pixels[start..end].to_vec());
        }

        let target = self
            .textures
            .get_mut(&dst)
            .ok_or_else(|| format!("blit target {dst:?} released before execution"))?;
        for (y, row) in rows.into_iter().enumerate() {
            let start = target.offset(0, y as u32, region.dst_layer);
            target.pixels[start..start + row.len()].copy_from_slice(&row);
        }
        Ok(())
    }

    fn execute_dispatch(
        &mut self,
        shader: &str,
        uniforms: &[f32],
        inputs: &[TextureHandle],
        output: TextureHandle,
    ) -> Result<(), String> {
        let kernel = self
            .kernels
            .get(shader)
            .ok_or_else(|| format!("shader {shader} unregistered before execution"))?;
        let images = inputs
            .iter()
            .map(|h| self.textures.get(h))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| format!("input of {shader} released before execution"))?;
        let desc = self
            .textures
            .get(&output)
            .map(|img| img.desc)
            .ok_or_else(|| format!("output of {shader} released before execution"))?;

        let pixels = kernel(&KernelArgs {
            uniforms,
            inputs: &images,
            output: desc,
        })?;

        let target = self
            .textures
            .get_mut(&output)
            .ok_or_else(|| format!("output of {shader} released before execution"))?;
        if pixels.len() != target.pixels.len() {
            return Err(format!(
                "{shader} produced {} values, expected {}",
                pixels.len(),
                target.pixels.len()
            ));
        }
        target.pixels = pixels;
        Ok(())
    }
}

impl ResourceBinding for CpuBinding {
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BindingError> {
        if desc.resolution.is_empty() || desc.layers == 0 {
            return Err(BindingError::Allocation(format!(
                "zero-sized texture {}x{}",
                desc.resolution, desc.layers
            )));
        }
        if let Some(limit) = self.max_textures {
            if self.textures.len() >= limit {
                return Err(BindingError::Allocation(format!(
                    "texture limit of {limit} reached"
                )));
            }
        }
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(handle, CpuImage::zeroed(*desc));
        self.stats.allocations += 1;
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_some() {
            self.stats.releases += 1;
        }
    }

    fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&handle).map(|img| img.desc)
    }

    fn make_command_buffer(&mut self) -> Result<CommandBufferId, BindingError> {
        if self.fail_command_buffers {
            return Err(BindingError::CommandBuffer("device unavailable".into()));
        }
        let id = CommandBufferId(self.next_command_buffer);
        self.next_command_buffer += 1;
        self.recording.insert(id, Vec::new());
        self.stats.command_buffers += 1;
        Ok(id)
    }

    fn blit(
        &mut self,
        command_buffer: CommandBufferId,
        src: TextureHandle,
        dst: TextureHandle,
        region: BlitRegion,
    ) -> Result<(), BindingError> {
        let source = self.image_or_err(src)?.desc;
        let target = self.image_or_err(dst)?.desc;
        if source.format != target.format {
            return Err(BindingError::Blit(format!(
                "format mismatch {:?} -> {:?}",
                source.format, target.format
            )));
        }
        let fits = |desc: &TextureDesc, layer: u32| {
            region.size.width <= desc.resolution.width
                && region.size.height <= desc.resolution.height
                && layer < desc.layers
        };
        if !fits(&source, region.src_layer) || !fits(&target, region.dst_layer) {
            return Err(BindingError::Blit(format!(
                "region {} (layer {} -> {}) out of bounds",
                region.size, region.src_layer, region.dst_layer
            )));
        }
        self.recording_mut(command_buffer)?
            .push(Command::Blit { src, dst, region });
        self.stats.blits += 1;
        Ok(())
    }

    fn upload(&mut self, dst: TextureHandle, pixels: &PixelBuffer) -> Result<(), BindingError> {
        let rgba = pixels
            .to_rgba_f32()
            .map_err(|e| BindingError::Upload(e.to_string()))?;
        let target = self
            .textures
            .get_mut(&dst)
            .ok_or(BindingError::UnknownTexture(dst))?;
        if target.desc.resolution != pixels.resolution || target.desc.layers != pixels.layers {
            return Err(BindingError::Upload(format!(
                "buffer {}x{} does not match texture {}x{}",
                pixels.resolution, pixels.layers, target.desc.resolution, target.desc.layers
            )));
        }
        target.pixels = rgba;
        self.stats.uploads += 1;
        Ok(())
    }

    fn dispatch_shader(
        &mut self,
        command_buffer: CommandBufferId,
        call: &ShaderCall<'_>,
    ) -> Result<(), BindingError> {
        if !self.kernels.contains_key(call.shader) {
            return Err(BindingError::ShaderNotFound(call.shader.to_string()));
        }
        for input in call.inputs {
            self.image_or_err(*input)?;
        }
        let output = self.image_or_err(call.output)?;
        if !output.desc.usage.contains(TextureUsage::STORAGE) {
            return Err(BindingError::Dispatch(format!(
                "output {:?} is not a storage texture",
                call.output
            )));
        }
        self.recording_mut(command_buffer)?.push(Command::Dispatch {
            shader: call.shader.to_string(),
            uniforms: call.uniforms.to_vec(),
            inputs: call.inputs.to_vec(),
            output: call.output,
        });
        self.stats.dispatches += 1;
        Ok(())
    }

    fn commit(&mut self, command_buffer: CommandBufferId) -> Result<SubmissionId, BindingError> {
        let commands = self
            .recording
            .remove(&command_buffer)
            .ok_or(BindingError::UnknownCommandBuffer(command_buffer))?;
        if self.fail_commits {
            return Err(BindingError::Commit("queue rejected submission".into()));
        }
        let id = SubmissionId(self.next_submission);
        self.next_submission += 1;
        self.stats.commits += 1;
        debug!(submission = id.0, commands = commands.len(), "CPU submission");

        self.queued.push_back((id, commands));
        if !self.deferred_completion {
            self.complete_all();
        }
        Ok(id)
    }

    fn discard(&mut self, command_buffer: CommandBufferId) {
        self.recording.remove(&command_buffer);
    }

    fn poll(&mut self) {
        if !self.deferred_completion {
            self.complete_all();
        }
    }

    fn is_complete(&self, submission: SubmissionId) -> bool {
        submission.0 <= self.completed_through
    }

    fn wait(&mut self, submission: SubmissionId) -> Result<(), BindingError> {
        if submission.0 >= self.next_submission {
            return Err(BindingError::UnknownSubmission(submission));
        }
        while submission.0 > self.completed_through {
            let Some((id, commands)) = self.queued.pop_front() else {
                break;
            };
            self.execute(commands);
            self.completed_through = id.0;
        }
        Ok(())
    }

    fn read_pixels(&mut self, handle: TextureHandle) -> Result<PixelBuffer, BindingError> {
        self.complete_all();
        let image = self.image_or_err(handle)?;
        PixelBuffer::from_rgba_f32(
            image.desc.resolution,
            image.desc.layers,
            image.desc.format,
            &image.pixels,
        )
        .map_err(|e| BindingError::Readback(e.to_string()))
    }
}
