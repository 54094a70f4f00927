use crate::backend::Backend;
use crate::pool::{PoolSlot, TransientPool};
use bitflags::bitflags;
use std::fmt;
use wgpu::TextureFormat;

/// Index into the resource table of the graph that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const INVALID: Self = Self(u32::MAX);

    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Texture({})", self.0)
        } else {
            write!(f, "Texture(invalid)")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }
}

bitflags! {
    /// Capabilities a transient texture must be created with, accumulated from
    /// every write declared against it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsageFlags: u32 {
        const RENDER_TARGET = 1 << 0;
        const DEPTH_STENCIL = 1 << 1;
        const UNORDERED_ACCESS = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    Common,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    UnorderedAccess,
    CopySource,
    CopyDest,
    Present,
}

impl ResourceState {
    pub fn implied_usage(self) -> TextureUsageFlags {
        match self {
            ResourceState::RenderTarget => TextureUsageFlags::RENDER_TARGET,
            ResourceState::DepthWrite => TextureUsageFlags::DEPTH_STENCIL,
            ResourceState::UnorderedAccess => TextureUsageFlags::UNORDERED_ACCESS,
            _ => TextureUsageFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub handle: TextureHandle,
    pub state: ResourceState,
    pub access: Access,
}

/// Where a texture's physical backing and tracked state live.
pub enum ResourceKind<'a, T> {
    /// Caller-owned texture; the graph reads and writes the caller's state cell
    /// and never allocates or frees the texture.
    External {
        texture: &'a T,
        state: &'a mut ResourceState,
    },
    /// Graph-owned texture, bound to a pool slot on first use.
    Transient {
        slot: Option<PoolSlot>,
        state: ResourceState,
    },
}

pub struct TextureResource<'a, T> {
    name: String,
    desc: TextureDesc,
    usage: TextureUsageFlags,
    kind: ResourceKind<'a, T>,
    pub(crate) first_use: Option<usize>,
    pub(crate) last_use: Option<usize>,
    pub(crate) used: bool,
    pub(crate) read: bool,
    pub(crate) required: bool,
}

impl<'a, T> TextureResource<'a, T> {
    fn new(name: String, desc: TextureDesc, kind: ResourceKind<'a, T>) -> Self {
        Self {
            name,
            desc,
            usage: TextureUsageFlags::empty(),
            kind,
            first_use: None,
            last_use: None,
            used: false,
            read: false,
            required: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn usage(&self) -> TextureUsageFlags {
        self.usage
    }

    pub fn kind(&self) -> &ResourceKind<'a, T> {
        &self.kind
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, ResourceKind::External { .. })
    }

    pub fn state(&self) -> ResourceState {
        match &self.kind {
            ResourceKind::External { state, .. } => **state,
            ResourceKind::Transient { state, .. } => *state,
        }
    }

    pub(crate) fn set_state(&mut self, new_state: ResourceState) {
        match &mut self.kind {
            ResourceKind::External { state, .. } => **state = new_state,
            ResourceKind::Transient { state, .. } => *state = new_state,
        }
    }

    pub fn first_use(&self) -> Option<usize> {
        self.first_use
    }

    pub fn last_use(&self) -> Option<usize> {
        self.last_use
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn pool_slot(&self) -> Option<PoolSlot> {
        match &self.kind {
            ResourceKind::Transient { slot, .. } => *slot,
            ResourceKind::External { .. } => None,
        }
    }

    /// True when a physical texture can be resolved for this resource.
    pub fn is_bound(&self) -> bool {
        match &self.kind {
            ResourceKind::External { .. } => true,
            ResourceKind::Transient { slot, .. } => slot.is_some(),
        }
    }

    /// Physical texture, borrowed either from the caller or from the pool.
    pub fn physical<'p, B>(&'p self, pool: &'p TransientPool<B>) -> Option<&'p T>
    where
        B: Backend<Texture = T>,
    {
        match &self.kind {
            ResourceKind::External { texture, .. } => Some(*texture),
            ResourceKind::Transient { slot, .. } => pool.texture((*slot)?),
        }
    }

    pub(crate) fn bind_slot(&mut self, pool_slot: PoolSlot, pool_state: ResourceState) {
        if let ResourceKind::Transient { slot, state } = &mut self.kind {
            *slot = Some(pool_slot);
            *state = pool_state;
        }
    }

    pub(crate) fn unbind_slot(&mut self) -> Option<(PoolSlot, ResourceState)> {
        match &mut self.kind {
            ResourceKind::Transient { slot, state } => slot.take().map(|slot| (slot, *state)),
            ResourceKind::External { .. } => None,
        }
    }

    fn accumulate_usage(&mut self, usage: TextureUsageFlags) {
        if !self.is_external() {
            self.usage |= usage;
        }
    }
}

impl<T> fmt::Debug for TextureResource<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureResource")
            .field("name", &self.name)
            .field("desc", &self.desc)
            .field("usage", &self.usage)
            .field("external", &self.is_external())
            .field("state", &self.state())
            .field("pool_slot", &self.pool_slot())
            .field("first_use", &self.first_use)
            .field("last_use", &self.last_use)
            .field("required", &self.required)
            .finish()
    }
}

pub struct ResourceRegistry<'a, T> {
    textures: Vec<TextureResource<'a, T>>,
}

impl<'a, T> ResourceRegistry<'a, T> {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
        }
    }

    pub fn register_texture(&mut self, name: impl Into<String>, desc: TextureDesc) -> TextureHandle {
        let handle = TextureHandle::new(self.textures.len());
        self.textures.push(TextureResource::new(
            name.into(),
            desc,
            ResourceKind::Transient {
                slot: None,
                state: ResourceState::Undefined,
            },
        ));
        handle
    }

    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        texture: &'a T,
        state: &'a mut ResourceState,
        desc: TextureDesc,
    ) -> TextureHandle {
        let handle = TextureHandle::new(self.textures.len());
        self.textures.push(TextureResource::new(
            name.into(),
            desc,
            ResourceKind::External { texture, state },
        ));
        handle
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureResource<'a, T>> {
        if !handle.is_valid() {
            return None;
        }
        self.textures.get(handle.index())
    }

    pub(crate) fn get_mut(&mut self, handle: TextureHandle) -> Option<&mut TextureResource<'a, T>> {
        if !handle.is_valid() {
            return None;
        }
        self.textures.get_mut(handle.index())
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureHandle, &TextureResource<'a, T>)> {
        self.textures
            .iter()
            .enumerate()
            .map(|(index, resource)| (TextureHandle::new(index), resource))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TextureResource<'a, T>> {
        self.textures.iter_mut()
    }

    /// Returns false when the handle does not resolve to a resource.
    pub(crate) fn accumulate_usage(&mut self, handle: TextureHandle, usage: TextureUsageFlags) -> bool {
        match self.get_mut(handle) {
            Some(resource) => {
                resource.accumulate_usage(usage);
                true
            }
            None => false,
        }
    }
}

impl<T> Default for ResourceRegistry<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}
