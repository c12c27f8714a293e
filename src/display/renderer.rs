// SPDX-License-Identifier: MPL-2.0
//! GPU side of the display: one persistent RGBA texture drawn as a
//! screen-filling quad.

use crate::error::{Error, Result};
use crate::media::FrameSize;
use std::sync::Arc;
use winit::window::Window;

/// Outcome of one render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Presented,
    /// The surface was lost or outdated; it has been reconfigured and this
    /// frame skipped.
    Skipped,
}

/// Surface, device and the single video texture.
///
/// Field order is drop order: GPU objects go before the surface.
pub struct FrameRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    texture: wgpu::Texture,
    frame_size: FrameSize,
    view_format: wgpu::TextureFormat,
    queue: wgpu::Queue,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
    surface: wgpu::Surface<'static>,
}

impl FrameRenderer {
    /// Creates the surface for `window` and a texture of `frame_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Display`] if no adapter, device or compatible surface
    /// format is available.
    pub async fn new(window: Arc<Window>, frame_size: FrameSize, vsync: bool) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface_size = window.inner_size();
        let surface = instance
            .create_surface(window)
            .map_err(|e| Error::Display(format!("Failed to create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Display(format!("Failed to request adapter: {e}")))?;
        log::debug!("Using GPU adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| Error::Display(format!("Failed to create device: {e}")))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = select_surface_format(&capabilities.formats)
            .ok_or_else(|| Error::Display("Surface reports no texture formats".to_string()))?;
        let present_mode = select_present_mode(&capabilities.present_modes, vsync);
        let (view_format, view_formats) = render_view_formats(format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: surface_size.width.max(1),
            height: surface_size.height.max(1),
            present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats,
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Video Frame Shader"),
            source: wgpu::ShaderSource::Wgsl(VIDEO_SHADER.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Video Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Video Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: view_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Rgba8Unorm, not Srgb: decoded frames are already gamma encoded.
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Frame Texture"),
            size: texture_extent(frame_size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Video Texture Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        log::debug!(
            "Surface configured: {}x{} {format:?} (drawn as {view_format:?}) {present_mode:?}",
            config.width,
            config.height
        );

        Ok(Self {
            pipeline,
            bind_group,
            texture,
            frame_size,
            view_format,
            queue,
            device,
            config,
            surface,
        })
    }

    /// Copies a full RGBA frame into the texture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Display`] if `rgba` does not match the texture size.
    pub fn upload(&self, rgba: &[u8]) -> Result<()> {
        let expected = self.frame_size.rgba_len();
        if rgba.len() != expected {
            return Err(Error::Display(format!(
                "Frame holds {} bytes, texture expects {expected}",
                rgba.len()
            )));
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.frame_size.width * 4),
                rows_per_image: Some(self.frame_size.height),
            },
            texture_extent(self.frame_size),
        );
        Ok(())
    }

    /// Draws the texture over the whole surface and presents it.
    ///
    /// `pre_present` runs right before the swap, for the windowing system's
    /// frame pacing hint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Display`] if the surface cannot provide a texture for
    /// a reason other than being lost or outdated.
    pub fn render(&mut self, pre_present: impl FnOnce()) -> Result<RenderOutcome> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(RenderOutcome::Skipped);
            }
            Err(e) => {
                return Err(Error::Display(format!("Failed to get surface texture: {e}")));
            }
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.view_format),
            ..Default::default()
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Video Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Video Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..4, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        pre_present();
        output.present();
        Ok(RenderOutcome::Presented)
    }

    /// Reconfigures the surface after the window's physical size changed.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        log::debug!("Surface resized to {width}x{height}");
    }
}

fn texture_extent(size: FrameSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

/// Picks the first non-sRGB surface format, falling back to the preferred one.
pub(crate) fn select_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first())
        .copied()
}

/// Format the quad is drawn in, and the extra view formats the surface must
/// allow for it. Frames are already gamma encoded, so an sRGB surface is
/// written through its linear view.
pub(crate) fn render_view_formats(
    surface_format: wgpu::TextureFormat,
) -> (wgpu::TextureFormat, Vec<wgpu::TextureFormat>) {
    let view_format = surface_format.remove_srgb_suffix();
    if view_format == surface_format {
        (view_format, Vec::new())
    } else {
        (view_format, vec![view_format])
    }
}

/// Fifo when vsync is requested; otherwise the lowest-latency mode offered.
pub(crate) fn select_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

/// Full-screen quad from four strip vertices; no vertex buffer.
const VIDEO_SHADER: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    // 0: top-left, 1: top-right, 2: bottom-left, 3: bottom-right
    let x = f32(vertex_index & 1u);
    let y = f32(vertex_index >> 1u);

    var output: VertexOutput;
    output.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    output.tex_coord = vec2<f32>(x, y);
    return output;
}

@group(0) @binding(0)
var video_texture: texture_2d<f32>;
@group(0) @binding(1)
var video_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(video_texture, video_sampler, input.tex_coord);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_prefers_linear() {
        let formats = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm,
        ];
        assert_eq!(
            select_surface_format(&formats),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [wgpu::TextureFormat::Rgba8UnormSrgb];
        assert_eq!(
            select_surface_format(&formats),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn srgb_surface_is_drawn_through_linear_view() {
        assert_eq!(
            render_view_formats(wgpu::TextureFormat::Bgra8UnormSrgb),
            (
                wgpu::TextureFormat::Bgra8Unorm,
                vec![wgpu::TextureFormat::Bgra8Unorm]
            )
        );
        assert_eq!(
            render_view_formats(wgpu::TextureFormat::Rgba8Unorm),
            (wgpu::TextureFormat::Rgba8Unorm, vec![])
        );
    }

    #[test]
    fn vsync_always_uses_fifo() {
        let modes = [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(&modes, true), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn no_vsync_prefers_mailbox_then_immediate() {
        let all = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Immediate,
            wgpu::PresentMode::Mailbox,
        ];
        assert_eq!(select_present_mode(&all, false), wgpu::PresentMode::Mailbox);

        let no_mailbox = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];
        assert_eq!(
            select_present_mode(&no_mailbox, false),
            wgpu::PresentMode::Immediate
        );
        assert_eq!(
            select_present_mode(&[wgpu::PresentMode::Fifo], false),
            wgpu::PresentMode::Fifo
        );
    }

    #[test]
    fn shader_declares_both_entry_points() {
        assert!(VIDEO_SHADER.contains("fn vs_main"));
        assert!(VIDEO_SHADER.contains("fn fs_main"));
    }
}
