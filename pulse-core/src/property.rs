// pulse-core: properties
// A property is a named, documented value over a closed primitive set;
// bags nest. update allocates, refresh must not.

use std::fmt;

/// A named, documented configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct Property<T> {
    name: String,
    description: String,
    value: T,
}

impl<T> Property<T> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.clone()
    }
}

impl<T: PropertyValue> Property<T> {
    /// Deep-update the value from `other`. May allocate; not real-time
    /// safe. Name and description are kept.
    pub fn update(&mut self, other: &Property<T>) -> bool {
        self.value.update_from(&other.value)
    }

    /// Full structural clone of `other`, including name and description.
    /// Not real-time safe.
    pub fn copy_from(&mut self, other: &Property<T>) -> bool {
        self.name.clone_from(&other.name);
        self.description.clone_from(&other.description);
        self.value.clone_from(&other.value);
        true
    }

    /// Value-only copy assuming identical structure. Fixed time and
    /// allocation-free for the fixed-size primitives; fails when the
    /// structures differ.
    pub fn refresh(&mut self, other: &Property<T>) -> bool {
        self.value.refresh_from(&other.value)
    }
}

/// Value behaviour behind [`Property::update`] and [`Property::refresh`].
pub trait PropertyValue: Clone + Send + 'static {
    fn update_from(&mut self, other: &Self) -> bool {
        self.clone_from(other);
        true
    }

    fn refresh_from(&mut self, other: &Self) -> bool {
        self.clone_from(other);
        true
    }
}

impl PropertyValue for bool {}
impl PropertyValue for char {}
impl PropertyValue for i32 {}
impl PropertyValue for u32 {}
impl PropertyValue for f64 {}
impl PropertyValue for String {}

impl PropertyValue for PropertyBag {
    fn update_from(&mut self, other: &Self) -> bool {
        self.update_from(other);
        true
    }

    fn refresh_from(&mut self, other: &Self) -> bool {
        self.refresh_from(other)
    }
}

/// Discriminant of the closed primitive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Char,
    Int,
    UInt,
    Double,
    Str,
    Bag,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Char => "char",
            PropertyKind::Int => "int",
            PropertyKind::UInt => "uint",
            PropertyKind::Double => "double",
            PropertyKind::Str => "string",
            PropertyKind::Bag => "bag",
        };
        f.write_str(name)
    }
}

/// One entry of a [`PropertyBag`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEntry {
    Bool(Property<bool>),
    Char(Property<char>),
    Int(Property<i32>),
    UInt(Property<u32>),
    Double(Property<f64>),
    Str(Property<String>),
    Bag(Property<PropertyBag>),
}

impl PropertyEntry {
    pub fn name(&self) -> &str {
        match self {
            PropertyEntry::Bool(p) => p.name(),
            PropertyEntry::Char(p) => p.name(),
            PropertyEntry::Int(p) => p.name(),
            PropertyEntry::UInt(p) => p.name(),
            PropertyEntry::Double(p) => p.name(),
            PropertyEntry::Str(p) => p.name(),
            PropertyEntry::Bag(p) => p.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            PropertyEntry::Bool(p) => p.description(),
            PropertyEntry::Char(p) => p.description(),
            PropertyEntry::Int(p) => p.description(),
            PropertyEntry::UInt(p) => p.description(),
            PropertyEntry::Double(p) => p.description(),
            PropertyEntry::Str(p) => p.description(),
            PropertyEntry::Bag(p) => p.description(),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyEntry::Bool(_) => PropertyKind::Bool,
            PropertyEntry::Char(_) => PropertyKind::Char,
            PropertyEntry::Int(_) => PropertyKind::Int,
            PropertyEntry::UInt(_) => PropertyKind::UInt,
            PropertyEntry::Double(_) => PropertyKind::Double,
            PropertyEntry::Str(_) => PropertyKind::Str,
            PropertyEntry::Bag(_) => PropertyKind::Bag,
        }
    }

    /// Present this entry to a visitor.
    pub fn accept(&self, visitor: &mut dyn PropertyVisitor) {
        match self {
            PropertyEntry::Bool(p) => visitor.visit_bool(p),
            PropertyEntry::Char(p) => visitor.visit_char(p),
            PropertyEntry::Int(p) => visitor.visit_int(p),
            PropertyEntry::UInt(p) => visitor.visit_uint(p),
            PropertyEntry::Double(p) => visitor.visit_double(p),
            PropertyEntry::Str(p) => visitor.visit_string(p),
            PropertyEntry::Bag(p) => visitor.visit_bag(p.name(), p.description(), p.value()),
        }
    }

    fn update_from(&mut self, other: &PropertyEntry) -> bool {
        match (self, other) {
            (PropertyEntry::Bool(a), PropertyEntry::Bool(b)) => a.update(b),
            (PropertyEntry::Char(a), PropertyEntry::Char(b)) => a.update(b),
            (PropertyEntry::Int(a), PropertyEntry::Int(b)) => a.update(b),
            (PropertyEntry::UInt(a), PropertyEntry::UInt(b)) => a.update(b),
            (PropertyEntry::Double(a), PropertyEntry::Double(b)) => a.update(b),
            (PropertyEntry::Str(a), PropertyEntry::Str(b)) => a.update(b),
            (PropertyEntry::Bag(a), PropertyEntry::Bag(b)) => a.update(b),
            _ => false,
        }
    }

    fn refresh_from(&mut self, other: &PropertyEntry) -> bool {
        match (self, other) {
            (PropertyEntry::Bool(a), PropertyEntry::Bool(b)) => a.refresh(b),
            (PropertyEntry::Char(a), PropertyEntry::Char(b)) => a.refresh(b),
            (PropertyEntry::Int(a), PropertyEntry::Int(b)) => a.refresh(b),
            (PropertyEntry::UInt(a), PropertyEntry::UInt(b)) => a.refresh(b),
            (PropertyEntry::Double(a), PropertyEntry::Double(b)) => a.refresh(b),
            (PropertyEntry::Str(a), PropertyEntry::Str(b)) => a.refresh(b),
            (PropertyEntry::Bag(a), PropertyEntry::Bag(b)) => a.refresh(b),
            _ => false,
        }
    }
}

/// Visitor over the closed primitive set; marshalling and introspection
/// are implemented against this.
pub trait PropertyVisitor {
    fn visit_bool(&mut self, p: &Property<bool>);
    fn visit_char(&mut self, p: &Property<char>);
    fn visit_int(&mut self, p: &Property<i32>);
    fn visit_uint(&mut self, p: &Property<u32>);
    fn visit_double(&mut self, p: &Property<f64>);
    fn visit_string(&mut self, p: &Property<String>);
    fn visit_bag(&mut self, name: &str, description: &str, bag: &PropertyBag);
}

/// An ordered heterogeneous collection of properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    bag_type: String,
    entries: Vec<PropertyEntry>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(bag_type: impl Into<String>) -> Self {
        Self {
            bag_type: bag_type.into(),
            entries: Vec::new(),
        }
    }

    pub fn bag_type(&self) -> &str {
        &self.bag_type
    }

    pub fn set_bag_type(&mut self, bag_type: impl Into<String>) {
        self.bag_type = bag_type.into();
    }

    pub fn add(&mut self, entry: PropertyEntry) {
        self.entries.push(entry);
    }

    pub fn add_bool(&mut self, name: &str, description: &str, value: bool) {
        self.add(PropertyEntry::Bool(Property::new(name, description, value)));
    }

    pub fn add_char(&mut self, name: &str, description: &str, value: char) {
        self.add(PropertyEntry::Char(Property::new(name, description, value)));
    }

    pub fn add_int(&mut self, name: &str, description: &str, value: i32) {
        self.add(PropertyEntry::Int(Property::new(name, description, value)));
    }

    pub fn add_uint(&mut self, name: &str, description: &str, value: u32) {
        self.add(PropertyEntry::UInt(Property::new(name, description, value)));
    }

    pub fn add_double(&mut self, name: &str, description: &str, value: f64) {
        self.add(PropertyEntry::Double(Property::new(name, description, value)));
    }

    pub fn add_string(&mut self, name: &str, description: &str, value: impl Into<String>) {
        self.add(PropertyEntry::Str(Property::new(
            name,
            description,
            value.into(),
        )));
    }

    pub fn add_bag(&mut self, name: &str, description: &str, bag: PropertyBag) {
        self.add(PropertyEntry::Bag(Property::new(name, description, bag)));
    }

    pub fn find(&self, name: &str) -> Option<&PropertyEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut PropertyEntry> {
        self.entries.iter_mut().find(|e| e.name() == name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.find(name) {
            Some(PropertyEntry::Bool(p)) => Some(*p.value()),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.find(name) {
            Some(PropertyEntry::Int(p)) => Some(*p.value()),
            _ => None,
        }
    }

    pub fn get_uint(&self, name: &str) -> Option<u32> {
        match self.find(name) {
            Some(PropertyEntry::UInt(p)) => Some(*p.value()),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.find(name) {
            Some(PropertyEntry::Double(p)) => Some(*p.value()),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.find(name) {
            Some(PropertyEntry::Str(p)) => Some(p.value()),
            _ => None,
        }
    }

    pub fn get_bag(&self, name: &str) -> Option<&PropertyBag> {
        match self.find(name) {
            Some(PropertyEntry::Bag(p)) => Some(p.value()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Deep-update from `other`: entries matching by name and kind are
    /// updated, the rest are appended. May allocate.
    pub fn update_from(&mut self, other: &PropertyBag) {
        for entry in &other.entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.name() == entry.name() && e.kind() == entry.kind())
            {
                Some(existing) => {
                    existing.update_from(entry);
                }
                None => self.entries.push(entry.clone()),
            }
        }
    }

    /// Value-only refresh: every entry of `self` must find a same-name,
    /// same-kind source in `other`. Returns false (leaving the remainder
    /// untouched) on the first structural mismatch.
    pub fn refresh_from(&mut self, other: &PropertyBag) -> bool {
        for entry in &mut self.entries {
            let source = other
                .entries
                .iter()
                .find(|e| e.name() == entry.name() && e.kind() == entry.kind());
            match source {
                Some(source) => {
                    if !entry.refresh_from(source) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// Present every entry, in order, to a visitor.
    pub fn accept(&self, visitor: &mut dyn PropertyVisitor) {
        for entry in &self.entries {
            entry.accept(visitor);
        }
    }
}

/// Decomposition of a user type into the closed primitive set.
///
/// Types implementing this can be stored in property files and exchanged
/// through bags without the bag learning the concrete type.
pub trait Decompose: Sized {
    fn decompose(&self, name: &str, description: &str) -> PropertyEntry;
    fn compose(entry: &PropertyEntry) -> Option<Self>;
}

impl Decompose for Vec<f64> {
    fn decompose(&self, name: &str, description: &str) -> PropertyEntry {
        let mut bag = PropertyBag::with_type("doubles");
        for (i, v) in self.iter().enumerate() {
            bag.add_double(&i.to_string(), "", *v);
        }
        PropertyEntry::Bag(Property::new(name, description, bag))
    }

    fn compose(entry: &PropertyEntry) -> Option<Self> {
        match entry {
            PropertyEntry::Bag(p) if p.value().bag_type() == "doubles" => {
                let mut out = Vec::with_capacity(p.value().len());
                for element in p.value().iter() {
                    match element {
                        PropertyEntry::Double(d) => out.push(*d.value()),
                        _ => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// Fill `prop` from the same-named entry of `bag`. False when the entry is
/// missing or does not decompose into `T`.
pub fn compose_property<T: Decompose>(bag: &PropertyBag, prop: &mut Property<T>) -> bool {
    match bag.find(prop.name()) {
        Some(entry) => match T::compose(entry) {
            Some(value) => {
                prop.set(value);
                true
            }
            None => false,
        },
        None => false,
    }
}

/// Decompose `prop` into a bag entry.
pub fn decompose_property<T: Decompose>(prop: &Property<T>) -> PropertyEntry {
    prop.value().decompose(prop.name(), prop.description())
}
