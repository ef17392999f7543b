//! Constant pool construction for one class.
//!
//! The generator interns every reference it emits (field/method refs, string
//! literals, invokedynamic call sites) so repeated lowering of similar
//! expressions cannot bloat the pool. Long and Double entries occupy two
//! indices per the class-file format. Serialization of the finished pool is
//! the class writer's concern, not ours.

use rustc_hash::FxHashMap;

use crate::consts;
use crate::error::{Error, Result};

/// Method handle kinds used by the concat bootstrap.
pub const REF_INVOKE_STATIC: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
    /// second slot of a Long/Double entry
    Padding,
}

impl Constant {
    fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Hashable interning key; float constants are keyed by their bit patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
}

/// One BootstrapMethods attribute entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub method_handle: u16,
    pub arguments: Vec<u16>,
}

#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: FxHashMap<Key, u16>,
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_lookup: FxHashMap<(u16, Vec<u16>), u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pool index slots used (the count field minus one).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    fn intern(&mut self, key: Key, constant: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }
        let width = constant.width();
        if self.entries.len() + width as usize > consts::MAX_POOL_ENTRIES {
            return Err(Error::PoolOverflow { entries: self.entries.len() });
        }
        // entry indices are 1-based
        let index = (self.entries.len() + 1) as u16;
        self.entries.push(constant);
        if width == 2 {
            self.entries.push(Constant::Padding);
        }
        self.lookup.insert(key, index);
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Key::Utf8(value.to_string()), Constant::Utf8(value.to_string()))
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Key::Integer(value), Constant::Integer(value))
    }

    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        self.intern(Key::Float(value.to_bits()), Constant::Float(value))
    }

    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.intern(Key::Long(value), Constant::Long(value))
    }

    pub fn add_double(&mut self, value: f64) -> Result<u16> {
        self.intern(Key::Double(value.to_bits()), Constant::Double(value))
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.intern(Key::Class(name_index), Constant::Class(name_index))
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.add_utf8(value)?;
        self.intern(Key::String(utf8), Constant::String(utf8))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let desc_index = self.add_utf8(descriptor)?;
        self.intern(
            Key::NameAndType(name_index, desc_index),
            Constant::NameAndType(name_index, desc_index),
        )
    }

    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        self.intern(Key::FieldRef(class, nat), Constant::FieldRef(class, nat))
    }

    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        self.intern(Key::MethodRef(class, nat), Constant::MethodRef(class, nat))
    }

    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.add_class(owner)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        self.intern(
            Key::InterfaceMethodRef(class, nat),
            Constant::InterfaceMethodRef(class, nat),
        )
    }

    pub fn add_method_handle(&mut self, kind: u8, reference: u16) -> Result<u16> {
        self.intern(
            Key::MethodHandle(kind, reference),
            Constant::MethodHandle(kind, reference),
        )
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> Result<u16> {
        let desc = self.add_utf8(descriptor)?;
        self.intern(Key::MethodType(desc), Constant::MethodType(desc))
    }

    /// Intern a BootstrapMethods entry, returning its attribute index.
    pub fn add_bootstrap_method(&mut self, method_handle: u16, arguments: Vec<u16>) -> Result<u16> {
        let key = (method_handle, arguments.clone());
        if let Some(&index) = self.bootstrap_lookup.get(&key) {
            return Ok(index);
        }
        let index = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push(BootstrapMethod { method_handle, arguments });
        self.bootstrap_lookup.insert(key, index);
        Ok(index)
    }

    pub fn add_invoke_dynamic(
        &mut self,
        bootstrap_index: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let nat = self.add_name_and_type(name, descriptor)?;
        self.intern(
            Key::InvokeDynamic(bootstrap_index, nat),
            Constant::InvokeDynamic(bootstrap_index, nat),
        )
    }
}
