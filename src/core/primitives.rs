use indexmap::IndexMap;
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;

/// Indirect object reference in a PDF document.
///
/// PDF objects can be referenced indirectly using object and generation
/// numbers. This is represented in PDF files as "N G R" (e.g., "5 0 R").
/// Equality is structural: two references are equal exactly when both
/// numbers match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    /// Object number
    pub num: u32,

    /// Generation number (0 for new objects, incremented for updates)
    pub generation: u32,
}

impl Ref {
    /// Create a new object reference.
    #[inline]
    pub const fn new(num: u32, generation: u32) -> Self {
        Self { num, generation }
    }

    /// Get the object ID as a tuple (for map keys).
    #[inline]
    pub const fn as_id(self) -> (u32, u32) {
        (self.num, self.generation)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

/// An atomic name token (`/Type`, `/Annot`, ...).
///
/// Names are a distinct object type: the name `/Annot` and the string
/// `(Annot)` never compare equal because they never share a representation.
/// Dictionary keys are always names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Name(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name(s.to_string())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Array storage: up to 4 elements inline (rectangles, matrices and kid
/// lists dominate), boxed for indirection to keep the enum finite.
pub type Array = SmallVec<[Box<PDFObject>; 4]>;

/// PDF object types as defined in the PDF specification.
///
/// This represents the set of primitive objects the document layer decodes
/// and the update writer serializes.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (integers and reals)
    Number(f64),

    /// String value (from literal strings like (hello))
    String(Vec<u8>),

    /// Hex string value (from hex strings like <48656c6c6f>)
    HexString(Vec<u8>),

    /// Name value (from /Name)
    Name(Name),

    /// Array of objects
    Array(Array),

    /// Dictionary (key-value pairs, insertion-ordered)
    Dictionary(Dict),

    /// Indirect object reference (like "5 0 R")
    Ref(Ref),

    /// End of file marker
    EOF,

    /// Keyword/operator token ("obj", "endobj", "xref", "trailer", ...)
    Command(String),
}

impl PDFObject {
    /// Builds an array object from owned values.
    pub fn array(items: impl IntoIterator<Item = PDFObject>) -> Self {
        PDFObject::Array(items.into_iter().map(Box::new).collect())
    }

    /// Builds a name object.
    pub fn name(name: &str) -> Self {
        PDFObject::Name(Name::new(name))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, PDFObject::EOF)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PDFObject::Null)
    }

    /// Returns true if this object is the given keyword.
    ///
    /// Accepts both name and command representations, since malformed
    /// documents occasionally spell keywords as names.
    #[inline]
    pub fn is_command(&self, cmd: &str) -> bool {
        match self {
            PDFObject::Name(name) => name.as_str() == cmd,
            PDFObject::Command(command) => command == cmd,
            _ => false,
        }
    }

    /// Returns the numeric value if this is a Number object.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the name if this is a Name object.
    pub fn as_name(&self) -> Option<&Name> {
        match self {
            PDFObject::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the dictionary if this is a Dictionary object.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PDFObject::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Returns the array elements if this is an Array object.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            PDFObject::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the reference if this is a Ref object.
    pub fn as_reference(&self) -> Option<Ref> {
        match self {
            PDFObject::Ref(r) => Some(*r),
            _ => None,
        }
    }
}

/// An insertion-ordered dictionary mapping names to objects.
///
/// Key order is significant for this crate: a rewritten page dictionary
/// must serialize its keys in the original order so that consumers relying
/// on round-trip stability see an unchanged document apart from `/Annots`.
/// Keys are unique; inserting an existing key replaces the value but keeps
/// the key's original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict {
    entries: IndexMap<Name, PDFObject>,
}

impl Dict {
    pub fn new() -> Self {
        Dict {
            entries: IndexMap::new(),
        }
    }

    /// Returns the stored value for a key, without resolving indirection.
    ///
    /// A value of `PDFObject::Ref` is returned as the reference itself;
    /// resolution is the cross-reference table's job (`XRef::fetch_if_ref`).
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.entries.get(key)
    }

    /// Inserts or replaces a value. Last write wins; a replaced key keeps
    /// its original position in the iteration order.
    pub fn set(&mut self, key: impl Into<Name>, value: PDFObject) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &PDFObject)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Name, PDFObject)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Name, PDFObject)>>(iter: T) -> Self {
        Dict {
            entries: iter.into_iter().collect(),
        }
    }
}
