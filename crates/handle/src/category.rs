use num_derive::{FromPrimitive, ToPrimitive};

/// The kind of driver object a [`Handle`] identifies. Handles are only unique within their category, a resource and a
/// view may share the same index and generation.
///
/// [`Handle`]: crate::Handle
#[repr(u64)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, FromPrimitive, ToPrimitive)]
pub enum HandleCategory {
	Resource = 0,
	View = 1,
	Sampler = 2,
	Pipeline = 3,
	DescriptorSet = 4,
}

impl HandleCategory {
	pub const VALUES: [HandleCategory; 5] = [
		HandleCategory::Resource,
		HandleCategory::View,
		HandleCategory::Sampler,
		HandleCategory::Pipeline,
		HandleCategory::DescriptorSet,
	];

	pub const fn to_u64(&self) -> u64 {
		*self as u64
	}

	pub const fn name(&self) -> &'static str {
		match self {
			HandleCategory::Resource => "resource",
			HandleCategory::View => "view",
			HandleCategory::Sampler => "sampler",
			HandleCategory::Pipeline => "pipeline",
			HandleCategory::DescriptorSet => "descriptor set",
		}
	}
}
