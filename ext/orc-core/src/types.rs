//! Schema description for ORC files
//!
//! A [`TypeDescription`] is an arena of nodes. Column ids are assigned by a
//! pre-order walk from the root, so every node covers the id range
//! `[column_id, max_column_id]` of its subtree. Mutating operations re-run the
//! id assignment over the whole arena.

use crate::{OrcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_DECIMAL_PRECISION: u32 = 38;
const DEFAULT_DECIMAL_PRECISION: u32 = 38;
const DEFAULT_DECIMAL_SCALE: u32 = 10;

/// Kind of an ORC type node, with the numeric codes used by the format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    String = 7,
    Binary = 8,
    Timestamp = 9,
    List = 10,
    Map = 11,
    Struct = 12,
    Union = 13,
    Decimal = 14,
    Date = 15,
    Varchar = 16,
    Char = 17,
    TimestampInstant = 18,
}

impl TypeKind {
    const ALL: [TypeKind; 19] = [
        TypeKind::Boolean,
        TypeKind::Byte,
        TypeKind::Short,
        TypeKind::Int,
        TypeKind::Long,
        TypeKind::Float,
        TypeKind::Double,
        TypeKind::String,
        TypeKind::Binary,
        TypeKind::Timestamp,
        TypeKind::List,
        TypeKind::Map,
        TypeKind::Struct,
        TypeKind::Union,
        TypeKind::Decimal,
        TypeKind::Date,
        TypeKind::Varchar,
        TypeKind::Char,
        TypeKind::TimestampInstant,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| OrcError::value(format!("Unknown type kind: {}", code)))
    }

    /// Kinds that own child types
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            TypeKind::List | TypeKind::Map | TypeKind::Struct | TypeKind::Union
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeKind::Byte | TypeKind::Short | TypeKind::Int | TypeKind::Long
        )
    }

    /// Keyword used for this kind in schema strings
    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Boolean => "boolean",
            TypeKind::Byte => "tinyint",
            TypeKind::Short => "smallint",
            TypeKind::Int => "int",
            TypeKind::Long => "bigint",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::String => "string",
            TypeKind::Binary => "binary",
            TypeKind::Timestamp => "timestamp",
            TypeKind::List => "array",
            TypeKind::Map => "map",
            TypeKind::Struct => "struct",
            TypeKind::Union => "uniontype",
            TypeKind::Decimal => "decimal",
            TypeKind::Date => "date",
            TypeKind::Varchar => "varchar",
            TypeKind::Char => "char",
            TypeKind::TimestampInstant => "timestamp with local time zone",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TypeNode {
    kind: TypeKind,
    column_id: u64,
    max_column_id: u64,
    children: Vec<usize>,
    field_names: Vec<String>,
    precision: u32,
    scale: u32,
    max_length: u32,
}

impl TypeNode {
    fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            column_id: 0,
            max_column_id: 0,
            children: Vec::new(),
            field_names: Vec::new(),
            precision: 0,
            scale: 0,
            max_length: 0,
        }
    }
}

/// A (possibly nested) ORC schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    nodes: Vec<TypeNode>,
    root: usize,
}

impl TypeDescription {
    fn leaf(node: TypeNode) -> Self {
        Self {
            nodes: vec![node],
            root: 0,
        }
    }

    /// Create a primitive type. Compound kinds need their dedicated constructors.
    pub fn primitive(kind: TypeKind) -> Result<Self> {
        match kind {
            TypeKind::List | TypeKind::Map | TypeKind::Struct | TypeKind::Union => Err(
                OrcError::value(format!("{} needs child types", kind.name())),
            ),
            TypeKind::Decimal => Self::decimal(DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE),
            TypeKind::Varchar | TypeKind::Char => Err(OrcError::value(format!(
                "{} needs a maximum length",
                kind.name()
            ))),
            _ => Ok(Self::leaf(TypeNode::new(kind))),
        }
    }

    pub fn decimal(precision: u32, scale: u32) -> Result<Self> {
        check_decimal(precision, scale)?;
        let mut node = TypeNode::new(TypeKind::Decimal);
        node.precision = precision;
        node.scale = scale;
        Ok(Self::leaf(node))
    }

    pub fn varchar(max_length: u32) -> Self {
        let mut node = TypeNode::new(TypeKind::Varchar);
        node.max_length = max_length;
        Self::leaf(node)
    }

    pub fn char(max_length: u32) -> Self {
        let mut node = TypeNode::new(TypeKind::Char);
        node.max_length = max_length;
        Self::leaf(node)
    }

    pub fn list(element: TypeDescription) -> Self {
        Self::compound(TypeKind::List, vec![element], Vec::new())
    }

    pub fn map(key: TypeDescription, value: TypeDescription) -> Self {
        Self::compound(TypeKind::Map, vec![key, value], Vec::new())
    }

    pub fn union(variants: Vec<TypeDescription>) -> Self {
        Self::compound(TypeKind::Union, variants, Vec::new())
    }

    pub fn struct_type<S: Into<String>>(fields: Vec<(S, TypeDescription)>) -> Self {
        let (names, types): (Vec<String>, Vec<TypeDescription>) =
            fields.into_iter().map(|(n, t)| (n.into(), t)).unzip();
        Self::compound(TypeKind::Struct, types, names)
    }

    fn compound(kind: TypeKind, children: Vec<TypeDescription>, names: Vec<String>) -> Self {
        let mut node = TypeNode::new(kind);
        node.field_names = names;
        let mut desc = Self::leaf(node);
        for child in children {
            let idx = desc.graft(&child, child.root);
            desc.nodes[0].children.push(idx);
        }
        desc.assign_ids();
        desc
    }

    /// Copies the subtree rooted at `idx` of `other` into this arena
    fn graft(&mut self, other: &TypeDescription, idx: usize) -> usize {
        let mut node = other.nodes[idx].clone();
        let children = std::mem::take(&mut node.children);
        let new_idx = self.nodes.len();
        self.nodes.push(node);
        for child in children {
            let child_idx = self.graft(other, child);
            self.nodes[new_idx].children.push(child_idx);
        }
        new_idx
    }

    fn assign_ids(&mut self) {
        fn walk(nodes: &mut [TypeNode], idx: usize, next: u64) -> u64 {
            nodes[idx].column_id = next;
            let mut max = next;
            for pos in 0..nodes[idx].children.len() {
                let child = nodes[idx].children[pos];
                max = walk(nodes, child, max + 1);
            }
            nodes[idx].max_column_id = max;
            max
        }
        walk(&mut self.nodes, self.root, 0);
    }

    /// Rebuilds the arena so only nodes reachable from the root remain
    fn compact(&mut self) {
        let mut fresh = Self::leaf(TypeNode::new(TypeKind::Boolean));
        fresh.nodes.clear();
        fresh.root = fresh.graft(self, self.root);
        *self = fresh;
    }

    /// Borrowed view of the root node
    pub fn root(&self) -> TypeRef<'_> {
        TypeRef {
            desc: self,
            idx: self.root,
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.root().kind()
    }

    pub fn column_id(&self) -> u64 {
        self.root().column_id()
    }

    pub fn max_column_id(&self) -> u64 {
        self.root().max_column_id()
    }

    pub fn precision(&self) -> u32 {
        self.root().precision()
    }

    pub fn scale(&self) -> u32 {
        self.root().scale()
    }

    pub fn max_length(&self) -> u32 {
        self.root().max_length()
    }

    /// Struct fields as (name, type) pairs
    pub fn fields(&self) -> impl Iterator<Item = (&str, TypeRef<'_>)> {
        self.root().fields()
    }

    pub fn set_precision(&mut self, precision: u32) -> Result<()> {
        let scale = self.require_decimal()?.scale;
        check_decimal(precision, scale)?;
        let root = self.root;
        self.nodes[root].precision = precision;
        Ok(())
    }

    pub fn set_scale(&mut self, scale: u32) -> Result<()> {
        let precision = self.require_decimal()?.precision;
        check_decimal(precision, scale)?;
        let root = self.root;
        self.nodes[root].scale = scale;
        Ok(())
    }

    pub fn set_max_length(&mut self, max_length: u32) -> Result<()> {
        let root = self.root;
        match self.nodes[root].kind {
            TypeKind::Varchar | TypeKind::Char => {
                self.nodes[root].max_length = max_length;
                Ok(())
            }
            other => Err(OrcError::value(format!(
                "Cannot set max length on type {}",
                other.name()
            ))),
        }
    }

    fn require_decimal(&self) -> Result<&TypeNode> {
        let node = &self.nodes[self.root];
        if node.kind != TypeKind::Decimal {
            return Err(OrcError::value(format!(
                "Cannot set precision or scale on type {}",
                node.kind.name()
            )));
        }
        Ok(node)
    }

    /// Append a field to a struct type
    pub fn add_field<S: Into<String>>(&mut self, name: S, field: TypeDescription) -> Result<()> {
        let root = self.root;
        if self.nodes[root].kind != TypeKind::Struct {
            return Err(OrcError::value("Fields can only be added to a struct"));
        }
        let name = name.into();
        if self.nodes[root].field_names.contains(&name) {
            return Err(OrcError::value(format!("Field '{}' already exists", name)));
        }
        let idx = self.graft(&field, field.root);
        self.nodes[root].children.push(idx);
        self.nodes[root].field_names.push(name);
        self.assign_ids();
        Ok(())
    }

    /// Remove a field from a struct type by name
    pub fn remove_field(&mut self, name: &str) -> Result<()> {
        let root = self.root;
        if self.nodes[root].kind != TypeKind::Struct {
            return Err(OrcError::value("Fields can only be removed from a struct"));
        }
        let pos = self.nodes[root]
            .field_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| OrcError::index(format!("Field '{}' not found", name)))?;
        self.nodes[root].children.remove(pos);
        self.nodes[root].field_names.remove(pos);
        self.compact();
        self.assign_ids();
        Ok(())
    }

    /// Resolve a dotted field path (`a.b.c`) to its column id
    pub fn find_column_id(&self, path: &str) -> Result<u64> {
        let mut current = self.root();
        for part in path.split('.') {
            current = current
                .fields()
                .find(|(name, _)| *name == part)
                .map(|(_, ty)| ty)
                .ok_or_else(|| OrcError::index(format!("Column '{}' not found", path)))?;
        }
        Ok(current.column_id())
    }

    /// Find the node with the given column id
    pub fn find_type(&self, column_id: u64) -> Result<TypeRef<'_>> {
        find_type(self.root(), column_id)
    }

    /// Projection of a struct schema onto some of its top-level fields.
    ///
    /// Kept nodes retain their original column ids. Non-struct roots are
    /// returned unchanged.
    pub fn select_fields(&self, indices: &[usize]) -> Result<TypeDescription> {
        let root = self.root();
        if root.kind() != TypeKind::Struct {
            return Ok(self.clone());
        }
        let count = root.children_count();
        if let Some(bad) = indices.iter().find(|&&i| i >= count) {
            return Err(OrcError::value(format!(
                "Column index {} out of range for {} fields",
                bad, count
            )));
        }
        let mut node = self.nodes[self.root].clone();
        node.children.clear();
        node.field_names.clear();
        let mut projected = Self::leaf(node);
        for (pos, child) in root.children().enumerate() {
            if indices.contains(&pos) {
                let idx = projected.graft(self, child.idx);
                projected.nodes[0].children.push(idx);
                projected.nodes[0]
                    .field_names
                    .push(root.field_names()[pos].clone());
            }
        }
        Ok(projected)
    }

    /// Projection by top-level field names
    pub fn select_names<S: AsRef<str>>(&self, names: &[S]) -> Result<TypeDescription> {
        let field_names = self.root().field_names();
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let pos = field_names
                .iter()
                .position(|n| n == name.as_ref())
                .ok_or_else(|| {
                    OrcError::value(format!("Column '{}' not found in schema", name.as_ref()))
                })?;
            indices.push(pos);
        }
        self.select_fields(&indices)
    }
}

fn check_decimal(precision: u32, scale: u32) -> Result<()> {
    if precision > MAX_DECIMAL_PRECISION {
        return Err(OrcError::value(format!(
            "Decimal precision {} exceeds {}",
            precision, MAX_DECIMAL_PRECISION
        )));
    }
    if precision > 0 && scale > precision {
        return Err(OrcError::value(format!(
            "Decimal scale {} exceeds precision {}",
            scale, precision
        )));
    }
    Ok(())
}

/// Pre-order search for a column id, descending into the child whose id range
/// contains the target.
pub fn find_type(root: TypeRef<'_>, column_id: u64) -> Result<TypeRef<'_>> {
    let mut current = root;
    loop {
        if current.column_id() == column_id {
            return Ok(current);
        }
        current = current
            .children()
            .find(|child| child.contains_id(column_id))
            .ok_or_else(|| OrcError::index(format!("Column {} not found", column_id)))?;
    }
}

/// Borrowed cursor into a [`TypeDescription`]
#[derive(Clone, Copy)]
pub struct TypeRef<'a> {
    desc: &'a TypeDescription,
    idx: usize,
}

impl<'a> TypeRef<'a> {
    fn node(&self) -> &'a TypeNode {
        &self.desc.nodes[self.idx]
    }

    pub fn kind(&self) -> TypeKind {
        self.node().kind
    }

    pub fn column_id(&self) -> u64 {
        self.node().column_id
    }

    pub fn max_column_id(&self) -> u64 {
        self.node().max_column_id
    }

    pub fn contains_id(&self, column_id: u64) -> bool {
        self.column_id() <= column_id && column_id <= self.max_column_id()
    }

    pub fn precision(&self) -> u32 {
        self.node().precision
    }

    pub fn scale(&self) -> u32 {
        self.node().scale
    }

    pub fn max_length(&self) -> u32 {
        self.node().max_length
    }

    pub fn field_names(&self) -> &'a [String] {
        &self.node().field_names
    }

    pub fn children_count(&self) -> usize {
        self.node().children.len()
    }

    pub fn child(&self, pos: usize) -> Option<TypeRef<'a>> {
        let desc = self.desc;
        self.node()
            .children
            .get(pos)
            .map(|&idx| TypeRef { desc, idx })
    }

    pub fn children(&self) -> impl Iterator<Item = TypeRef<'a>> + 'a {
        let desc = self.desc;
        self.node()
            .children
            .iter()
            .map(move |&idx| TypeRef { desc, idx })
    }

    /// Struct fields as (name, type) pairs; empty for other kinds
    pub fn fields(&self) -> impl Iterator<Item = (&'a str, TypeRef<'a>)> + 'a {
        self.node()
            .field_names
            .iter()
            .map(String::as_str)
            .zip(self.children())
    }

    /// Owned copy of this subtree. Column ids are kept as they are.
    pub fn to_description(&self) -> TypeDescription {
        let mut fresh = TypeDescription {
            nodes: Vec::new(),
            root: 0,
        };
        fresh.root = fresh.graft(self.desc, self.idx);
        fresh
    }
}

impl fmt::Debug for TypeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({} #{})", self, self.column_id())
    }
}

impl fmt::Display for TypeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Decimal => write!(f, "decimal({},{})", self.precision(), self.scale()),
            TypeKind::Varchar | TypeKind::Char => {
                write!(f, "{}({})", self.kind().name(), self.max_length())
            }
            TypeKind::List | TypeKind::Map | TypeKind::Union => {
                write!(f, "{}<", self.kind().name())?;
                for (pos, child) in self.children().enumerate() {
                    if pos > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(">")
            }
            TypeKind::Struct => {
                f.write_str("struct<")?;
                for (pos, (name, child)) in self.fields().enumerate() {
                    if pos > 0 {
                        f.write_str(",")?;
                    }
                    write_field_name(f, name)?;
                    write!(f, ":{}", child)?;
                }
                f.write_str(">")
            }
            kind => f.write_str(kind.name()),
        }
    }
}

fn write_field_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        f.write_str(name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root())
    }
}

impl FromStr for TypeDescription {
    type Err = OrcError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = SchemaParser { input: s, pos: 0 };
        let desc = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(desc)
    }
}

struct SchemaParser<'a> {
    input: &'a str,
    pos: usize,
}

impl SchemaParser<'_> {
    fn error(&self, msg: &str) -> OrcError {
        OrcError::value(format!(
            "Invalid schema '{}' at position {}: {}",
            self.input, self.pos, msg
        ))
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: char) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: char) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", token)))
        }
    }

    fn word(&mut self) -> &str {
        self.skip_whitespace();
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.input[start..start + len]
    }

    fn number(&mut self) -> Result<u32> {
        let word = self.word();
        word.parse::<u32>()
            .map_err(|_| OrcError::value(format!("Invalid number '{}' in schema", word)))
    }

    fn field_name(&mut self) -> Result<String> {
        self.skip_whitespace();
        if self.rest().starts_with('`') {
            self.pos += 1;
            let mut name = String::new();
            loop {
                let next = self
                    .rest()
                    .find('`')
                    .ok_or_else(|| self.error("unterminated quoted field name"))?;
                name.push_str(&self.rest()[..next]);
                self.pos += next + 1;
                if self.rest().starts_with('`') {
                    name.push('`');
                    self.pos += 1;
                } else {
                    return Ok(name);
                }
            }
        }
        let name = self.word().to_string();
        if name.is_empty() {
            return Err(self.error("expected a field name"));
        }
        Ok(name)
    }

    fn parse_type(&mut self) -> Result<TypeDescription> {
        let word = self.word().to_ascii_lowercase();
        match word.as_str() {
            "boolean" => TypeDescription::primitive(TypeKind::Boolean),
            "tinyint" => TypeDescription::primitive(TypeKind::Byte),
            "smallint" => TypeDescription::primitive(TypeKind::Short),
            "int" => TypeDescription::primitive(TypeKind::Int),
            "bigint" => TypeDescription::primitive(TypeKind::Long),
            "float" => TypeDescription::primitive(TypeKind::Float),
            "double" => TypeDescription::primitive(TypeKind::Double),
            "string" => TypeDescription::primitive(TypeKind::String),
            "binary" => TypeDescription::primitive(TypeKind::Binary),
            "date" => TypeDescription::primitive(TypeKind::Date),
            "timestamp" => {
                let save = self.pos;
                let phrase: Vec<String> = (0..4).map(|_| self.word().to_ascii_lowercase()).collect();
                if phrase == ["with", "local", "time", "zone"] {
                    TypeDescription::primitive(TypeKind::TimestampInstant)
                } else {
                    self.pos = save;
                    TypeDescription::primitive(TypeKind::Timestamp)
                }
            }
            "decimal" => {
                if self.eat('(') {
                    let precision = self.number()?;
                    self.expect(',')?;
                    let scale = self.number()?;
                    self.expect(')')?;
                    TypeDescription::decimal(precision, scale)
                } else {
                    TypeDescription::primitive(TypeKind::Decimal)
                }
            }
            "varchar" | "char" => {
                self.expect('(')?;
                let len = self.number()?;
                self.expect(')')?;
                if word == "varchar" {
                    Ok(TypeDescription::varchar(len))
                } else {
                    Ok(TypeDescription::char(len))
                }
            }
            "array" => {
                self.expect('<')?;
                let element = self.parse_type()?;
                self.expect('>')?;
                Ok(TypeDescription::list(element))
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect('>')?;
                Ok(TypeDescription::map(key, value))
            }
            "uniontype" => {
                self.expect('<')?;
                let mut variants = vec![self.parse_type()?];
                while self.eat(',') {
                    variants.push(self.parse_type()?);
                }
                self.expect('>')?;
                Ok(TypeDescription::union(variants))
            }
            "struct" => {
                self.expect('<')?;
                let mut fields = Vec::new();
                if !self.eat('>') {
                    loop {
                        let name = self.field_name()?;
                        self.expect(':')?;
                        fields.push((name, self.parse_type()?));
                        if !self.eat(',') {
                            break;
                        }
                    }
                    self.expect('>')?;
                }
                Ok(TypeDescription::struct_type(fields))
            }
            "" => Err(self.error("expected a type")),
            other => Err(self.error(&format!("unknown type '{}'", other))),
        }
    }
}
