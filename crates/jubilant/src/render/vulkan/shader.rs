//! Shader loading and the fixed graphics pipeline
//!
//! SPIR-V is read from disk into words, wrapped in short-lived modules and
//! baked into a pipeline whose viewport and scissor are dynamic, so the
//! pipeline survives swapchain recreation.

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point name for both stages
const SHADER_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// State set at record time instead of at pipeline creation
pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Shader binary errors
#[derive(Error, Debug)]
pub enum ShaderError {
    /// File could not be read
    #[error("Failed to read shader {path:?}: {source}")]
    Io {
        /// Shader path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Byte length is not a whole number of 32-bit words
    #[error("Shader {path:?} is {len} bytes, not a multiple of 4")]
    Misaligned {
        /// Shader path
        path: PathBuf,
        /// Byte length found
        len: usize,
    },

    /// File holds no code
    #[error("Shader {path:?} is empty")]
    Empty {
        /// Shader path
        path: PathBuf,
    },
}

/// Decode SPIR-V bytes into words
///
/// `path` only labels errors.
pub fn load_spirv(bytes: &[u8], path: &Path) -> Result<Vec<u32>, ShaderError> {
    if bytes.is_empty() {
        return Err(ShaderError::Empty { path: path.to_path_buf() });
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and decode a SPIR-V file
pub fn read_spirv_file(path: impl AsRef<Path>) -> Result<Vec<u32>, ShaderError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_spirv(&bytes, path)
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_words(device: Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let words = read_spirv_file(&path)?;
        log::debug!("Loaded shader {:?} ({} words)", path.as_ref(), words.len());
        Self::from_words(device, &words)
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage description with the `main` entry point
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(SHADER_ENTRY)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout with no descriptor sets and no push constants
    pub fn empty(device: Device) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, layout })
    }

    /// Get layout handle
    pub const fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Rasterizer settings for the triangle
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
}

impl GraphicsPipeline {
    /// Build the triangle pipeline from two SPIR-V files
    ///
    /// The shader modules only live for the duration of this call.
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader_path: &Path,
        fragment_shader_path: &Path,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device.clone(), vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), fragment_shader_path)?;

        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        // Vertices come from gl_VertexIndex
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout = PipelineLayout::empty(device.clone())?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VulkanError::InitializationFailed("Pipeline creation returned no pipeline".to_string())
        })?;

        log::info!("Graphics pipeline created");

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        // Layout field drops after this
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_load_spirv_decodes_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());
        let words = load_spirv(&bytes, Path::new("tri.spv")).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_load_spirv_ignores_input_alignment() {
        let mut buffer = vec![0u8];
        buffer.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
        let words = load_spirv(&buffer[1..], Path::new("offset.spv")).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC]);
    }

    #[test]
    fn test_load_spirv_rejects_partial_words() {
        let err = load_spirv(&[0x03, 0x02, 0x23, 0x07, 0x00], Path::new("bad.spv")).unwrap_err();
        assert!(matches!(err, ShaderError::Misaligned { len: 5, .. }));
    }

    #[test]
    fn test_load_spirv_rejects_empty() {
        let err = load_spirv(&[], Path::new("empty.spv")).unwrap_err();
        assert!(matches!(err, ShaderError::Empty { .. }));
        assert!(err.to_string().contains("empty.spv"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_spirv_file("definitely/not/here.spv").unwrap_err();
        match err {
            ShaderError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("definitely/not/here.spv"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_spirv_file_from_disk() {
        let path = std::env::temp_dir().join(format!("jubilant_shader_test_{}.spv", std::process::id()));
        std::fs::write(&path, SPIRV_MAGIC.to_le_bytes()).unwrap();
        let words = read_spirv_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC]);
    }

    #[test]
    fn test_fixed_state() {
        assert_eq!(DYNAMIC_STATES, [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);
        let raster = rasterization_state();
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.depth_clamp_enable, vk::FALSE);
        assert!((raster.line_width - 1.0).abs() < f32::EPSILON);
    }
}
