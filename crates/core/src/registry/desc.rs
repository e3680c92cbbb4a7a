use bitflags::bitflags;

/// A native format code. Translating formats between APIs happens outside of this crate, the registry only caches
/// whatever the backend reported.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Format(pub u32);

impl Format {
	pub const UNKNOWN: Format = Format(0);
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ResourceType {
	Buffer,
	Texture1D,
	Texture2D,
	Texture3D,
}

bitflags! {
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
	pub struct ResourceUsage: u32 {
		const SHADER_RESOURCE = 1 << 0;
		const UNORDERED_ACCESS = 1 << 1;
		const RENDER_TARGET = 1 << 2;
		const DEPTH_STENCIL = 1 << 3;
		const CONSTANT_BUFFER = 1 << 4;
		const VERTEX_BUFFER = 1 << 5;
		const INDEX_BUFFER = 1 << 6;
		const INDIRECT_ARGUMENT = 1 << 7;
		const COPY_SOURCE = 1 << 8;
		const COPY_DEST = 1 << 9;
		const CPU_READ = 1 << 10;
		const CPU_WRITE = 1 << 11;
	}
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct ResourceDesc {
	pub ty: ResourceType,
	/// size in bytes for buffers, texels for textures
	pub width: u64,
	pub height: u32,
	pub depth_or_layers: u16,
	pub levels: u16,
	pub samples: u16,
	pub format: Format,
	pub usage: ResourceUsage,
}

impl ResourceDesc {
	pub fn buffer(size: u64, usage: ResourceUsage) -> Self {
		Self {
			ty: ResourceType::Buffer,
			width: size,
			height: 1,
			depth_or_layers: 1,
			levels: 1,
			samples: 1,
			format: Format::UNKNOWN,
			usage,
		}
	}

	pub fn texture_2d(width: u32, height: u32, levels: u16, format: Format, usage: ResourceUsage) -> Self {
		Self {
			ty: ResourceType::Texture2D,
			width: width as u64,
			height,
			depth_or_layers: 1,
			levels,
			samples: 1,
			format,
			usage,
		}
	}

	/// The byte length of the device-visible address range backing this resource. Only buffers have one.
	pub fn byte_len(&self) -> Option<u64> {
		match self.ty {
			ResourceType::Buffer => Some(self.width),
			_ => None,
		}
	}
}

/// The kind of descriptor a view occupies.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ViewKind {
	ShaderResource,
	RenderTarget,
	DepthStencil,
	UnorderedAccess,
	Sampler,
}

impl ViewKind {
	pub fn heap_kind(&self) -> crate::descriptor::HeapKind {
		use crate::descriptor::HeapKind;
		match self {
			ViewKind::ShaderResource | ViewKind::UnorderedAccess => HeapKind::View,
			ViewKind::RenderTarget => HeapKind::RenderTarget,
			ViewKind::DepthStencil => HeapKind::DepthStencil,
			ViewKind::Sampler => HeapKind::Sampler,
		}
	}

	/// The resource usage a resource must have been created with to allow views of this kind.
	pub fn required_usage(&self) -> ResourceUsage {
		match self {
			ViewKind::ShaderResource => ResourceUsage::SHADER_RESOURCE,
			ViewKind::RenderTarget => ResourceUsage::RENDER_TARGET,
			ViewKind::DepthStencil => ResourceUsage::DEPTH_STENCIL,
			ViewKind::UnorderedAccess => ResourceUsage::UNORDERED_ACCESS,
			ViewKind::Sampler => ResourceUsage::empty(),
		}
	}
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ViewDimension {
	Buffer,
	Texture1D,
	Texture1DArray,
	Texture2D,
	Texture2DArray,
	Texture2DMultisample,
	Texture3D,
	TextureCube,
	TextureCubeArray,
}

/// The part of a resource a view covers.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ViewSubresource {
	Buffer { offset: u64, size: u64 },
	Texture { first_level: u16, levels: u16, first_layer: u16, layers: u16 },
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct ViewDesc {
	pub kind: ViewKind,
	pub format: Format,
	pub dimension: ViewDimension,
	pub subresource: ViewSubresource,
}

impl ViewDesc {
	pub fn buffer(kind: ViewKind, offset: u64, size: u64) -> Self {
		Self {
			kind,
			format: Format::UNKNOWN,
			dimension: ViewDimension::Buffer,
			subresource: ViewSubresource::Buffer { offset, size },
		}
	}

	pub fn texture_2d(kind: ViewKind, format: Format, first_level: u16, levels: u16) -> Self {
		Self {
			kind,
			format,
			dimension: ViewDimension::Texture2D,
			subresource: ViewSubresource::Texture {
				first_level,
				levels,
				first_layer: 0,
				layers: 1,
			},
		}
	}
}

/// Texel mixing mode when sampling between texels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub enum Filter {
	/// Nearest neighbor sampling.
	#[default]
	Nearest = 0,
	/// Linear Interpolation
	Linear = 1,
}

/// How edges should be handled in texture addressing.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Hash)]
pub enum AddressMode {
	/// Clamp the value to the edge of the texture
	#[default]
	ClampToEdge = 0,
	/// Repeat the texture in a tiling fashion
	Repeat = 1,
	/// Repeat the texture, mirroring it every repeat
	MirrorRepeat = 2,
	/// Clamp the value to the border of the texture
	ClampToBorder = 3,
}

/// Color variation to use when sampler addressing mode is [`AddressMode::ClampToBorder`]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BorderColor {
	/// [0, 0, 0, 0]
	#[default]
	TransparentBlack,
	/// [0, 0, 0, 1]
	OpaqueBlack,
	/// [1, 1, 1, 1]
	OpaqueWhite,
}

#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct SamplerDesc {
	pub mag_filter: Filter,
	pub min_filter: Filter,
	pub mipmap_mode: Filter,
	pub address_mode_u: AddressMode,
	pub address_mode_v: AddressMode,
	pub address_mode_w: AddressMode,
	pub max_anisotropy: Option<f32>,
	pub min_lod: f32,
	pub max_lod: Option<f32>,
	pub border_color: BorderColor,
}
