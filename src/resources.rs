//! Resource dictionaries: named ColorSpace, Pattern, Shading and XObject
//! entries, read and replaced by name.
//!
//! Entries that are indirect objects are replaced in the document's object
//! table, so every page and form referencing the same object sees the
//! converted version. Direct entries are replaced inside the category
//! dictionary they live in.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::colorspace::ColorSpace;
use crate::errors::{GrayscaleError, Result};
use crate::pattern::Pattern;
use crate::utils::{resolve, resolve_with_id};
use crate::xobject::XObject;

const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Resource categories touched by the grayscale conversion
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    ColorSpace,
    Pattern,
    Shading,
    XObject,
}

impl ResourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::ColorSpace => "ColorSpace",
            ResourceKind::Pattern => "Pattern",
            ResourceKind::Shading => "Shading",
            ResourceKind::XObject => "XObject",
        }
    }
}

/// Where a resource entry is stored in the document. Stays the same when
/// the entry is replaced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum EntryLocation {
    /// The entry is a reference to this object
    Object(ObjectId),
    /// Direct entry `name` of a dictionary stored in this object
    Named(ObjectId, String),
}

/// A resource dictionary, either an indirect object of the document or a
/// dictionary owned by the caller.
#[derive(Debug, Clone)]
pub enum Resources {
    Indirect(ObjectId),
    Direct(Dictionary),
}

impl Default for Resources {
    fn default() -> Self {
        Resources::Direct(Dictionary::new())
    }
}

impl Resources {
    pub fn new(dict: Dictionary) -> Self {
        Resources::Direct(dict)
    }

    /// Reads a `/Resources` entry. References stay references, direct
    /// dictionaries are copied and have to be written back by the caller
    /// (see [`Resources::into_object`]).
    pub fn from_entry(doc: &Document, entry: &Object) -> Result<Self> {
        match resolve_with_id(doc, entry)? {
            (Some(id), Object::Dictionary(_)) => Ok(Resources::Indirect(id)),
            (None, Object::Dictionary(d)) => Ok(Resources::Direct(d.clone())),
            (_, other) => Err(GrayscaleError::mismatch("resource dictionary", other)),
        }
    }

    /// Resources of a page, following `/Parent` for inherited resources.
    /// Direct resource dictionaries are moved into their own object, so
    /// that changes reach every page sharing them.
    pub fn for_page(doc: &mut Document, page_id: ObjectId) -> Result<Self> {
        match find_page_resources(doc, page_id)? {
            Some((owner, Object::Dictionary(direct))) => {
                let moved = doc.add_object(Object::Dictionary(direct));
                doc.get_object_mut(owner)?
                    .as_dict_mut()?
                    .set("Resources", Object::Reference(moved));
                Ok(Resources::Indirect(moved))
            }
            Some((_, entry)) => Resources::from_entry(doc, &entry),
            None => Ok(Resources::default()),
        }
    }

    /// Read-only variant of [`Resources::for_page`], copying direct
    /// resource dictionaries instead of moving them.
    pub fn of_page(doc: &Document, page_id: ObjectId) -> Result<Self> {
        match find_page_resources(doc, page_id)? {
            Some((_, entry)) => Resources::from_entry(doc, &entry),
            None => Ok(Resources::default()),
        }
    }

    /// The object to store under `/Resources` of the owner
    pub fn into_object(self) -> Object {
        match self {
            Resources::Indirect(id) => Object::Reference(id),
            Resources::Direct(d) => Object::Dictionary(d),
        }
    }

    pub fn dict<'a>(&'a self, doc: &'a Document) -> Result<&'a Dictionary> {
        match self {
            Resources::Indirect(id) => Ok(doc.get_object(*id)?.as_dict()?),
            Resources::Direct(d) => Ok(d),
        }
    }

    fn dict_mut<'a>(&'a mut self, doc: &'a mut Document) -> Result<&'a mut Dictionary> {
        match self {
            Resources::Indirect(id) => Ok(doc.get_object_mut(*id)?.as_dict_mut()?),
            Resources::Direct(d) => Ok(d),
        }
    }

    /// Looks up `name` in the `kind` category. Returns the resolved value
    /// and, for indirect entries, the object id. `None` if there is no
    /// such entry.
    pub fn lookup(
        &self,
        doc: &Document,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<(Option<ObjectId>, Object)>> {
        let dict = self.dict(doc)?;
        let category = match dict.get(kind.key().as_bytes()) {
            Ok(c) => resolve(doc, c)?,
            Err(_) => return Ok(None),
        };
        let category = match category {
            Object::Dictionary(d) => d,
            other => return Err(GrayscaleError::mismatch("resource category dictionary", other)),
        };
        match category.get(name.as_bytes()) {
            Ok(entry) => {
                let (id, value) = resolve_with_id(doc, entry)?;
                Ok(Some((id, value.clone())))
            }
            Err(_) => Ok(None),
        }
    }

    /// Location of the entry `name` in the `kind` category. `None` when the
    /// entry lives in a dictionary the caller owns, which has no id.
    pub(crate) fn entry_location(
        &self,
        doc: &Document,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<EntryLocation>> {
        if let Some((Some(id), _)) = self.lookup(doc, kind, name)? {
            return Ok(Some(EntryLocation::Object(id)));
        }
        let category_id = match self.dict(doc)?.get(kind.key().as_bytes()) {
            Ok(entry @ Object::Reference(_)) => resolve_with_id(doc, entry)?.0,
            _ => None,
        };
        let owner = match (category_id, self) {
            (Some(id), _) => Some(id),
            (None, Resources::Indirect(id)) => Some(*id),
            (None, Resources::Direct(_)) => None,
        };
        Ok(owner.map(|id| EntryLocation::Named(id, name.to_string())))
    }

    fn get(&self, doc: &Document, kind: ResourceKind, name: &str) -> Result<(Option<ObjectId>, Object)> {
        self.lookup(doc, kind, name)?
            .ok_or_else(|| GrayscaleError::undefined(kind.key(), name))
    }

    /// Replaces the entry `name` in the `kind` category with `value`.
    pub fn set(&mut self, doc: &mut Document, kind: ResourceKind, name: &str, value: Object) -> Result<()> {
        // an indirect entry is replaced where it lives
        if let Some((Some(id), _)) = self.lookup(doc, kind, name)? {
            doc.objects.insert(id, value);
            return Ok(());
        }

        let category_id = match self.dict(doc)?.get(kind.key().as_bytes()) {
            Ok(entry @ Object::Reference(_)) => resolve_with_id(doc, entry)?.0,
            _ => None,
        };
        let key = kind.key();
        match category_id {
            Some(id) => {
                doc.get_object_mut(id)?.as_dict_mut()?.set(name, value);
            }
            None => {
                let dict = self.dict_mut(doc)?;
                if !matches!(dict.get(key.as_bytes()), Ok(Object::Dictionary(_))) {
                    dict.set(key, Object::Dictionary(Dictionary::new()));
                }
                if let Ok(Object::Dictionary(category)) = dict.get_mut(key.as_bytes()) {
                    category.set(name, value);
                }
            }
        }
        Ok(())
    }

    /// Named colorspace. Device family names resolve without an entry.
    pub fn color_space(&self, doc: &Document, name: &str) -> Result<ColorSpace> {
        match self.lookup(doc, ResourceKind::ColorSpace, name)? {
            Some((_, obj)) => ColorSpace::from_object(doc, &obj),
            None => ColorSpace::from_family_name(name)
                .ok_or_else(|| GrayscaleError::undefined("ColorSpace", name)),
        }
    }

    pub fn set_color_space(&mut self, doc: &mut Document, name: &str, cs: &ColorSpace) -> Result<()> {
        let obj = cs.to_object(doc);
        self.set(doc, ResourceKind::ColorSpace, name, obj)
    }

    pub fn pattern(&self, doc: &Document, name: &str) -> Result<Pattern> {
        let (id, obj) = self.get(doc, ResourceKind::Pattern, name)?;
        Pattern::from_object(doc, id, obj)
    }

    pub fn set_pattern(&mut self, doc: &mut Document, name: &str, pattern: Pattern) -> Result<()> {
        let obj = pattern.into_object();
        self.set(doc, ResourceKind::Pattern, name, obj)
    }

    /// Shading dictionary (or stream, for mesh shadings)
    pub fn shading(&self, doc: &Document, name: &str) -> Result<Object> {
        Ok(self.get(doc, ResourceKind::Shading, name)?.1)
    }

    pub fn set_shading(&mut self, doc: &mut Document, name: &str, shading: Object) -> Result<()> {
        self.set(doc, ResourceKind::Shading, name, shading)
    }

    pub fn xobject(&self, doc: &Document, name: &str) -> Result<XObject> {
        let (id, obj) = self.get(doc, ResourceKind::XObject, name)?;
        XObject::from_object(doc, id, obj)
    }

    pub fn set_xobject(&mut self, doc: &mut Document, name: &str, xobject: XObject) -> Result<()> {
        let obj = xobject.into_object();
        self.set(doc, ResourceKind::XObject, name, obj)
    }
}

/// The page tree node holding the resources of `page_id`, and the
/// `/Resources` entry itself
fn find_page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<(ObjectId, Object)>> {
    let mut current = page_id;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let node = doc.get_object(current)?.as_dict()?;
        if let Ok(entry) = node.get(b"Resources") {
            return Ok(Some((current, entry.clone())));
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return Ok(None),
        }
    }
    Ok(None)
}
