//! Compute kernels for the CPU device
//!
//! A kernel stands in for the entry point of a compute program. It sees the program's
//! bindings by their declared names and runs the whole dispatch grid in one call.

use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;

use super::store::BufferStore;
use crate::gpu::device::BufferBinding;
use crate::gpu::pipeline::UniformValue;

/// Host implementation of a compute entry point
pub trait Kernel {
    fn dispatch(&self, ctx: &mut KernelContext<'_>, groups: [u32; 3]);
}

impl<F> Kernel for F
where
    F: Fn(&mut KernelContext<'_>, [u32; 3]),
{
    fn dispatch(&self, ctx: &mut KernelContext<'_>, groups: [u32; 3]) {
        self(ctx, groups)
    }
}

/// A kernel's view of the device during one dispatch
pub struct KernelContext<'a> {
    pub(super) store: &'a mut BufferStore,
    pub(super) entry: &'a str,
    pub(super) storage: FxHashMap<&'a str, Option<BufferBinding>>,
    pub(super) uniforms: FxHashMap<&'a str, UniformValue>,
    pub(super) workgroup_size: [u32; 3],
}

impl<'a> KernelContext<'a> {
    pub fn entry(&self) -> &str {
        self.entry
    }

    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    /// Invocation count along x for `groups`
    pub fn invocations_x(&self, groups: [u32; 3]) -> u32 {
        groups[0] * self.workgroup_size[0]
    }

    fn binding(&mut self, name: &str) -> Option<BufferBinding> {
        match self.storage.get(name) {
            Some(Some(binding)) => Some(*binding),
            Some(None) => {
                self.store
                    .fault(format_args!("'{}' reads unbound buffer '{}'", self.entry, name));
                None
            }
            None => {
                log::error!("[CpuDevice] Kernel '{}' has no binding named '{}'", self.entry, name);
                panic!("kernel '{}' has no binding named '{}'", self.entry, name);
            }
        }
    }

    /// Length of a storage binding in 32-bit words
    pub fn binding_len(&mut self, name: &str) -> u32 {
        self.binding(name).map_or(0, |b| (b.size / 4) as u32)
    }

    pub fn load(&mut self, name: &str, index: u32) -> u32 {
        match self.binding(name) {
            Some(binding) => self.store.load(&binding, index),
            None => 0,
        }
    }

    pub fn store(&mut self, name: &str, index: u32, value: u32) {
        if let Some(binding) = self.binding(name) {
            self.store.store(&binding, index, value);
        }
    }

    pub fn load_f32(&mut self, name: &str, index: u32) -> f32 {
        f32::from_bits(self.load(name, index))
    }

    pub fn store_f32(&mut self, name: &str, index: u32, value: f32) {
        self.store(name, index, value.to_bits());
    }

    /// Wrapping atomic add; returns the previous value
    pub fn atomic_add(&mut self, name: &str, index: u32, value: u32) -> u32 {
        let old = self.load(name, index);
        self.store(name, index, old.wrapping_add(value));
        old
    }

    /// Wrapping atomic subtract; returns the previous value
    pub fn atomic_sub(&mut self, name: &str, index: u32, value: u32) -> u32 {
        let old = self.load(name, index);
        self.store(name, index, old.wrapping_sub(value));
        old
    }

    pub fn read_range(&mut self, name: &str, start: u32, count: u32) -> Vec<u32> {
        match self.binding(name) {
            Some(binding) => (start..start + count)
                .map(|i| self.store.load(&binding, i))
                .collect(),
            None => vec![0; count as usize],
        }
    }

    pub fn write_range(&mut self, name: &str, start: u32, words: &[u32]) {
        if let Some(binding) = self.binding(name) {
            for (i, &word) in words.iter().enumerate() {
                self.store.store(&binding, start + i as u32, word);
            }
        }
    }

    pub fn uniform(&self, name: &str) -> UniformValue {
        match self.uniforms.get(name) {
            Some(value) => *value,
            None => {
                log::error!("[CpuDevice] Kernel '{}' reads unset uniform '{}'", self.entry, name);
                panic!("kernel '{}' reads unset uniform '{}'", self.entry, name);
            }
        }
    }

    pub fn uniform_u32(&self, name: &str) -> u32 {
        match self.uniform(name) {
            UniformValue::U32(v) => v,
            UniformValue::I32(v) => v as u32,
            other => self.wrong_type(name, other),
        }
    }

    pub fn uniform_f32(&self, name: &str) -> f32 {
        match self.uniform(name) {
            UniformValue::F32(v) => v,
            other => self.wrong_type(name, other),
        }
    }

    pub fn uniform_vec3(&self, name: &str) -> Vec3 {
        match self.uniform(name) {
            UniformValue::Vec3(v) => v,
            other => self.wrong_type(name, other),
        }
    }

    pub fn uniform_vec4(&self, name: &str) -> Vec4 {
        match self.uniform(name) {
            UniformValue::Vec4(v) => v,
            other => self.wrong_type(name, other),
        }
    }

    pub fn uniform_mat4(&self, name: &str) -> Mat4 {
        match self.uniform(name) {
            UniformValue::Mat4(v) => v,
            other => self.wrong_type(name, other),
        }
    }

    fn wrong_type(&self, name: &str, value: UniformValue) -> ! {
        log::error!(
            "[CpuDevice] Kernel '{}' reads uniform '{}' as the wrong type ({:?})",
            self.entry,
            name,
            value.ty()
        );
        panic!("uniform '{}' of kernel '{}' has type {:?}", name, self.entry, value.ty());
    }
}
