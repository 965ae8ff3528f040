use std::collections::{BTreeMap, HashMap};

use crate::kit::{Collection, Point, SpeckleObject};

/// Chunk size used when a chunkable member does not name one.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Member-name prefix marking a dynamic member as detachable.
pub const DETACH_PREFIX: char = '@';

/// How a member is decomposed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemberFlags {
    pub detachable: bool,
    /// `Some(n)` splits the member's sequence into chunks of at most `n`.
    pub chunk_size: Option<usize>,
}

impl MemberFlags {
    pub const INLINE: Self = Self {
        detachable: false,
        chunk_size: None,
    };

    pub const DETACHED: Self = Self {
        detachable: true,
        chunk_size: None,
    };

    /// Chunkable members are always detachable.
    pub fn chunked(size: usize) -> Self {
        Self {
            detachable: true,
            chunk_size: Some(size.max(1)),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunk_size.is_some()
    }

    /// Flags implied by a member name alone.
    ///
    /// `@name` detaches; `@(N)name` chunks by N, and `@()name` chunks by
    /// [`DEFAULT_CHUNK_SIZE`].
    pub fn from_member_name(name: &str) -> Self {
        let Some(rest) = name.strip_prefix(DETACH_PREFIX) else {
            return Self::INLINE;
        };
        if let Some(inner) = rest.strip_prefix('(') {
            if let Some(close) = inner.find(')') {
                let digits = &inner[..close];
                if digits.chars().all(|c| c.is_ascii_digit()) {
                    let size = digits.parse().unwrap_or(DEFAULT_CHUNK_SIZE);
                    return Self::chunked(size);
                }
            }
        }
        Self::DETACHED
    }
}

/// Static metadata for one member of a registered type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberSchema {
    pub name: String,
    pub flags: MemberFlags,
    pub required: bool,
}

impl MemberSchema {
    pub fn inline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: MemberFlags::INLINE,
            required: false,
        }
    }

    pub fn detachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: MemberFlags::DETACHED,
            required: false,
        }
    }

    pub fn chunkable(name: impl Into<String>, max_size: usize) -> Self {
        Self {
            name: name.into(),
            flags: MemberFlags::chunked(max_size),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Decomposition metadata for one `speckle_type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSchema {
    pub speckle_type: String,
    pub members: BTreeMap<String, MemberSchema>,
}

impl TypeSchema {
    pub fn new(speckle_type: impl Into<String>) -> Self {
        Self {
            speckle_type: speckle_type.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn member(mut self, member: MemberSchema) -> Self {
        self.members.insert(member.name.clone(), member);
        self
    }

    pub fn required_members(&self) -> impl Iterator<Item = &str> {
        self.members
            .values()
            .filter(|m| m.required)
            .map(|m| m.name.as_str())
    }
}

/// Type registry consulted by the decomposition engine.
///
/// Registries are plain values passed into serializers and deserializers;
/// there is no process-wide instance. Lookups walk the colon-separated
/// inheritance chain of a `speckle_type` from the most specific segment to
/// the least specific, so `"Objects.Geometry.Mesh:Custom.Mesh"` resolves
/// `Custom.Mesh` before `Objects.Geometry.Mesh`.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in kit types.
    pub fn with_builtin_kit() -> Self {
        let mut registry = Self::new();
        registry.register(Point::schema());
        registry.register(Collection::schema());
        registry
    }

    pub fn register(&mut self, schema: TypeSchema) -> Option<TypeSchema> {
        self.types.insert(schema.speckle_type.clone(), schema)
    }

    pub fn get(&self, speckle_type: &str) -> Option<&TypeSchema> {
        self.types.get(speckle_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Schemas along the inheritance chain, most specific first.
    pub fn resolve_chain<'a>(&'a self, speckle_type: &'a str) -> impl Iterator<Item = &'a TypeSchema> {
        speckle_type
            .rsplit(':')
            .filter_map(move |segment| self.types.get(segment))
    }

    /// Whether any schema in the chain is registered.
    pub fn knows(&self, speckle_type: &str) -> bool {
        self.resolve_chain(speckle_type).next().is_some()
    }

    /// Decomposition flags for `member` on a node of `speckle_type`.
    ///
    /// Registered schemas win; otherwise the member-name convention applies.
    pub fn member_flags(&self, speckle_type: &str, member: &str) -> MemberFlags {
        self.resolve_chain(speckle_type)
            .find_map(|schema| schema.members.get(member))
            .map(|m| m.flags)
            .unwrap_or_else(|| MemberFlags::from_member_name(member))
    }

    /// Required members declared anywhere along the chain.
    pub fn required_members(&self, speckle_type: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .resolve_chain(speckle_type)
            .flat_map(|schema| schema.required_members().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
