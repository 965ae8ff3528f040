//! Strongly-typed views over [`Base`].
//!
//! Typed structs are a convenience for hosts and tests. The decomposition
//! engine only ever sees `Base` plus the [`TypeSchema`] a type contributes.

use crate::base::{Base, NodeRef};
use crate::error::TypeError;
use crate::schema::{MemberSchema, TypeSchema, DEFAULT_CHUNK_SIZE};
use crate::value::Value;

/// A typed object convertible to and from a dynamic [`Base`].
pub trait SpeckleObject: Sized {
    /// Discriminator written to `speckle_type`.
    const SPECKLE_TYPE: &'static str;

    /// Decomposition metadata for this type.
    fn schema() -> TypeSchema {
        TypeSchema::new(Self::SPECKLE_TYPE)
    }

    fn to_base(&self) -> Base;

    fn from_base(base: &Base) -> Result<Self, TypeError>;
}

/// Whether `base` is `speckle_type` or derives from it.
pub fn is_of_type(base: &Base, speckle_type: &str) -> bool {
    base.speckle_type().rsplit(':').any(|segment| segment == speckle_type)
}

fn check_type<T: SpeckleObject>(base: &Base) -> Result<(), TypeError> {
    if is_of_type(base, T::SPECKLE_TYPE) {
        Ok(())
    } else {
        Err(TypeError::UnexpectedType {
            expected: T::SPECKLE_TYPE.to_string(),
            found: base.speckle_type().to_string(),
        })
    }
}

fn member<'a>(base: &'a Base, name: &str) -> Result<&'a Value, TypeError> {
    base.get(name).ok_or_else(|| TypeError::MissingMember {
        speckle_type: base.speckle_type().to_string(),
        member: name.to_string(),
    })
}

fn number(base: &Base, name: &str) -> Result<f64, TypeError> {
    member(base, name)?.as_f64().ok_or(TypeError::WrongMemberType {
        member: name.to_string(),
        expected: "number",
    })
}

fn optional_string(base: &Base, name: &str) -> Option<String> {
    base.get(name).and_then(Value::as_str).map(str::to_string)
}

/// A point in 3D space.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub units: Option<String>,
    pub application_id: Option<String>,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            units: None,
            application_id: None,
        }
    }
}

impl SpeckleObject for Point {
    const SPECKLE_TYPE: &'static str = "Objects.Geometry.Point";

    fn schema() -> TypeSchema {
        TypeSchema::new(Self::SPECKLE_TYPE)
            .member(MemberSchema::inline("x").required())
            .member(MemberSchema::inline("y").required())
            .member(MemberSchema::inline("z").required())
    }

    fn to_base(&self) -> Base {
        let mut base = Base::new(Self::SPECKLE_TYPE)
            .with("x", self.x)
            .with("y", self.y)
            .with("z", self.z);
        if let Some(units) = &self.units {
            base.set("units", units.as_str());
        }
        base.set_application_id(self.application_id.clone());
        base
    }

    fn from_base(base: &Base) -> Result<Self, TypeError> {
        check_type::<Self>(base)?;
        Ok(Self {
            x: number(base, "x")?,
            y: number(base, "y")?,
            z: number(base, "z")?,
            units: optional_string(base, "units"),
            application_id: base.application_id().map(str::to_string),
        })
    }
}

/// A named, ordered group of nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    pub name: String,
    pub collection_type: Option<String>,
    pub elements: Vec<NodeRef>,
    pub application_id: Option<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_type: None,
            elements: Vec::new(),
            application_id: None,
        }
    }

    pub fn push(&mut self, element: impl Into<NodeRef>) {
        self.elements.push(element.into());
    }
}

impl SpeckleObject for Collection {
    const SPECKLE_TYPE: &'static str = "Speckle.Core.Models.Collection";

    fn schema() -> TypeSchema {
        TypeSchema::new(Self::SPECKLE_TYPE)
            .member(MemberSchema::inline("name").required())
            .member(MemberSchema::chunkable("elements", DEFAULT_CHUNK_SIZE))
    }

    fn to_base(&self) -> Base {
        let elements: Vec<Value> = self.elements.iter().cloned().map(Value::Node).collect();
        let mut base = Base::new(Self::SPECKLE_TYPE)
            .with("name", self.name.as_str())
            .with("elements", elements);
        if let Some(kind) = &self.collection_type {
            base.set("collectionType", kind.as_str());
        }
        base.set_application_id(self.application_id.clone());
        base
    }

    fn from_base(base: &Base) -> Result<Self, TypeError> {
        check_type::<Self>(base)?;
        let name = member(base, "name")?
            .as_str()
            .ok_or(TypeError::WrongMemberType {
                member: "name".into(),
                expected: "string",
            })?
            .to_string();
        let elements = match base.get("elements") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_node().cloned().ok_or(TypeError::WrongMemberType {
                        member: "elements".into(),
                        expected: "list of nodes",
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(TypeError::WrongMemberType {
                    member: "elements".into(),
                    expected: "list of nodes",
                })
            }
        };
        Ok(Self {
            name,
            collection_type: optional_string(base, "collectionType"),
            elements,
            application_id: base.application_id().map(str::to_string),
        })
    }
}
