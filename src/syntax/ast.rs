//! Abstract syntax tree for Modelica stored definitions.
//!
//! The tree is a closed family of tagged variants. Every enum node carries an
//! internally tagged serde representation `{"@type": TAG, ...fields}` so a
//! tree can be persisted and reconstructed without re-parsing; the tag set is
//! stable and checked on deserialisation (a mismatch surfaces as
//! [`crate::errors::Error::InvalidNode`] through [`from_tagged_value`]).
//!
//! Identifier terminals serialise with the tag `IDENT`, literal expressions
//! with `UNSIGNED_INTEGER`, `UNSIGNED_REAL`, `STRING` and `BOOLEAN`.
//!
//! Canonical schema notes: dotted names use `parts`, component references use
//! `parts` with per-part subscripts, and initial equation/algorithm sections
//! are an `initial` flag on the section node.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Debug, Display};

/// Location of a token or node in the source file.
#[derive(Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start: u32,
    pub end: u32,
    pub file_name: String,
}

impl Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_name, self.start_line, self.start_column
        )
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_name, self.start_line, self.start_column
        )
    }
}

/// An identifier (or literal) terminal with its source location.
///
/// Persists as `{"@type": "IDENT", "text": ..., "location": ...}`.
#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub text: String,
    pub location: Location,
}

impl Token {
    pub fn new(text: impl Into<String>, location: Location) -> Self {
        Token {
            text: text.into(),
            location,
        }
    }

    /// A token with no source location, for synthesised nodes.
    pub fn synthetic(text: impl Into<String>) -> Self {
        Token {
            text: text.into(),
            location: Location::default(),
        }
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Token", 3)?;
        st.serialize_field("@type", "IDENT")?;
        st.serialize_field("text", &self.text)?;
        st.serialize_field("location", &self.location)?;
        st.end()
    }
}

#[derive(Deserialize)]
struct TokenRecord {
    #[serde(rename = "@type", default)]
    tag: Option<String>,
    text: String,
    #[serde(default)]
    location: Location,
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = TokenRecord::deserialize(deserializer)?;
        if let Some(tag) = &record.tag {
            if tag != "IDENT" {
                return Err(D::Error::custom(format!(
                    "expected @type \"IDENT\", found {:?}",
                    tag
                )));
            }
        }
        Ok(Token {
            text: record.text,
            location: record.location,
        })
    }
}

/// A dotted name such as `Modelica.Blocks.Continuous`.
#[derive(Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    pub parts: Vec<Token>,
}

impl Name {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Name {
            parts: parts.into_iter().map(Token::synthetic).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// First component, if any.
    pub fn head(&self) -> Option<&str> {
        self.parts.first().map(|t| t.text.as_str())
    }

    /// Final component, if any.
    pub fn last(&self) -> Option<&str> {
        self.parts.last().map(|t| t.text.as_str())
    }

    /// The name without its first component.
    pub fn tail(&self) -> Name {
        Name {
            parts: self.parts.iter().skip(1).cloned().collect(),
        }
    }

    pub fn as_dotted(&self) -> String {
        self.parts
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_dotted())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_dotted())
    }
}

/// A type reference: optional leading `.` (lookup from the root scope) and a
/// dotted name.
#[derive(Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeSpecifier {
    pub global: bool,
    pub name: Name,
}

impl TypeSpecifier {
    pub fn from_name(name: Name) -> Self {
        TypeSpecifier {
            global: false,
            name,
        }
    }
}

impl Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global {
            write!(f, ".")?;
        }
        write!(f, "{}", self.name)
    }
}

impl Debug for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", format!("{}", self))
    }
}

//-----------------------------------------------------------------------------
// Stored definitions and class definitions
//-----------------------------------------------------------------------------

/// Top-level content of one `.mo` file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDefinition {
    pub within: Option<Name>,
    pub classes: Vec<ClassDefinition>,
}

impl StoredDefinition {
    /// First class definition in the file, if any.
    pub fn first_class(&self) -> Option<&ClassDefinition> {
        self.classes.first()
    }
}

/// Specialised class kind, with the Modelica reserved-word spelling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    #[default]
    #[serde(rename = "class")]
    Class,
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "record")]
    Record,
    #[serde(rename = "operator record")]
    OperatorRecord,
    #[serde(rename = "block")]
    Block,
    #[serde(rename = "connector")]
    Connector,
    #[serde(rename = "expandable connector")]
    ExpandableConnector,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "package")]
    Package,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "operator function")]
    OperatorFunction,
    #[serde(rename = "operator")]
    Operator,
}

impl Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassKind::Class => "class",
            ClassKind::Model => "model",
            ClassKind::Record => "record",
            ClassKind::OperatorRecord => "operator record",
            ClassKind::Block => "block",
            ClassKind::Connector => "connector",
            ClassKind::ExpandableConnector => "expandable connector",
            ClassKind::Type => "type",
            ClassKind::Package => "package",
            ClassKind::Function => "function",
            ClassKind::OperatorFunction => "operator function",
            ClassKind::Operator => "operator",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purity {
    #[default]
    #[serde(rename = "none")]
    Empty,
    #[serde(rename = "pure")]
    Pure,
    #[serde(rename = "impure")]
    Impure,
}

/// A class definition: prefixes, kind, and specifier.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    #[serde(default)]
    pub is_partial: bool,
    #[serde(default)]
    pub is_encapsulated: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_inner: bool,
    #[serde(default)]
    pub is_outer: bool,
    #[serde(default)]
    pub is_redeclare: bool,
    #[serde(default)]
    pub is_replaceable: bool,
    #[serde(default)]
    pub purity: Purity,
    pub kind: ClassKind,
    pub specifier: ClassSpecifier,
    #[serde(default)]
    pub constraining: Option<ConstrainingClause>,
}

impl ClassDefinition {
    /// The declared identifier of this class.
    pub fn name(&self) -> &str {
        self.specifier.ident().text.as_str()
    }

    /// All sections of a long specifier; empty for the other forms.
    pub fn sections(&self) -> &[Section] {
        match &self.specifier {
            ClassSpecifier::Long { sections, .. } => sections,
            _ => &[],
        }
    }

    /// Elements of every element section, in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.sections().iter().flat_map(|s| match s {
            Section::Element { elements, .. } => elements.as_slice(),
            _ => &[],
        })
    }

    /// Equations of every equation section, in declaration order.
    pub fn equations(&self) -> impl Iterator<Item = &Equation> {
        self.sections().iter().flat_map(|s| match s {
            Section::Equation { equations, .. } => equations.as_slice(),
            _ => &[],
        })
    }

    /// The trailing `annotation (...)` of a long specifier.
    pub fn annotation(&self) -> Option<&ClassModification> {
        match &self.specifier {
            ClassSpecifier::Long { annotation, .. } => annotation.as_ref(),
            _ => None,
        }
    }
}

/// Constraining clause of a replaceable element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstrainingClause {
    pub type_specifier: TypeSpecifier,
    #[serde(default)]
    pub modification: Option<ClassModification>,
}

/// The body form of a class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ClassSpecifier {
    /// `IDENT ... end IDENT`
    #[serde(rename = "LongClassSpecifier")]
    Long {
        ident: Token,
        #[serde(default)]
        description: Description,
        sections: Vec<Section>,
        #[serde(default)]
        annotation: Option<ClassModification>,
        end_ident: Token,
    },
    /// `IDENT = type_specifier [subscripts] [modification]`
    #[serde(rename = "ShortClassSpecifier")]
    Short {
        ident: Token,
        type_specifier: TypeSpecifier,
        #[serde(default)]
        subscripts: Vec<Subscript>,
        #[serde(default)]
        modification: Option<ClassModification>,
        #[serde(default)]
        description: Description,
    },
    /// `IDENT = enumeration(lit, ...)` or `enumeration(:)`
    #[serde(rename = "EnumerationClassSpecifier")]
    Enumeration {
        ident: Token,
        literals: Vec<EnumerationLiteral>,
        #[serde(default)]
        unspecified: bool,
        #[serde(default)]
        description: Description,
    },
    /// `IDENT = der(type_specifier, ident, ...)`
    #[serde(rename = "DerClassSpecifier")]
    Der {
        ident: Token,
        type_specifier: TypeSpecifier,
        idents: Vec<Token>,
        #[serde(default)]
        description: Description,
    },
}

impl ClassSpecifier {
    pub fn ident(&self) -> &Token {
        match self {
            ClassSpecifier::Long { ident, .. }
            | ClassSpecifier::Short { ident, .. }
            | ClassSpecifier::Enumeration { ident, .. }
            | ClassSpecifier::Der { ident, .. } => ident,
        }
    }
}

impl Default for ClassSpecifier {
    fn default() -> Self {
        ClassSpecifier::Long {
            ident: Token::default(),
            description: Description::default(),
            sections: Vec::new(),
            annotation: None,
            end_ident: Token::default(),
        }
    }
}

/// One literal of an enumeration type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationLiteral {
    pub ident: Token,
    #[serde(default)]
    pub description: Description,
}

/// Description string(s) plus optional annotation.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub strings: Vec<Token>,
    #[serde(default)]
    pub annotation: Option<ClassModification>,
}

impl Description {
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.annotation.is_none()
    }

    /// The description strings joined the way Modelica concatenates them.
    pub fn text(&self) -> String {
        self.strings
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

//-----------------------------------------------------------------------------
// Sections and elements
//-----------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "protected")]
    Protected,
}

/// A composition part of a long class specifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Section {
    #[serde(rename = "ElementSection")]
    Element {
        visibility: Visibility,
        elements: Vec<Element>,
    },
    #[serde(rename = "EquationSection")]
    Equation {
        #[serde(default)]
        initial: bool,
        equations: Vec<Equation>,
    },
    #[serde(rename = "AlgorithmSection")]
    Algorithm {
        #[serde(default)]
        initial: bool,
        statements: Vec<Statement>,
    },
}

/// An element of a class body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Element {
    #[serde(rename = "ClassDefinition")]
    ClassDefinition(ClassDefinition),
    #[serde(rename = "ComponentClause")]
    ComponentClause(ComponentClause),
    #[serde(rename = "ExtendsClause")]
    ExtendsClause(ExtendsClause),
    /// `import A.B.C;` or `import X = A.B.C;`
    #[serde(rename = "ImportClause")]
    ImportClause(ImportClause),
    /// `import A.B.{X, Y};`
    #[serde(rename = "CompoundImportClause")]
    CompoundImportClause(CompoundImportClause),
    /// `import A.B.*;`
    #[serde(rename = "UnqualifiedImportClause")]
    UnqualifiedImportClause(UnqualifiedImportClause),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendsClause {
    pub type_specifier: TypeSpecifier,
    #[serde(default)]
    pub modification: Option<ClassModification>,
    #[serde(default)]
    pub annotation: Option<ClassModification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportClause {
    /// Short name of `import X = A.B.C;`
    #[serde(default)]
    pub alias: Option<Token>,
    pub name: Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundImportClause {
    pub name: Name,
    pub imports: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnqualifiedImportClause {
    pub name: Name,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flow {
    #[default]
    #[serde(rename = "none")]
    Empty,
    #[serde(rename = "flow")]
    Flow,
    #[serde(rename = "stream")]
    Stream,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variability {
    #[default]
    #[serde(rename = "none")]
    Empty,
    #[serde(rename = "constant")]
    Constant,
    #[serde(rename = "discrete")]
    Discrete,
    #[serde(rename = "parameter")]
    Parameter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Causality {
    #[default]
    #[serde(rename = "none")]
    Empty,
    #[serde(rename = "input")]
    Input,
    #[serde(rename = "output")]
    Output,
}

/// One component clause: shared prefixes and type, one or more declarations.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentClause {
    #[serde(default)]
    pub is_redeclare: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_inner: bool,
    #[serde(default)]
    pub is_outer: bool,
    #[serde(default)]
    pub is_replaceable: bool,
    #[serde(default)]
    pub flow: Flow,
    #[serde(default)]
    pub variability: Variability,
    #[serde(default)]
    pub causality: Causality,
    pub type_specifier: TypeSpecifier,
    /// Clause-level array dimensions shared by every declaration.
    #[serde(default)]
    pub subscripts: Vec<Subscript>,
    pub declarations: Vec<ComponentDeclaration>,
}

/// One declared component inside a clause.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDeclaration {
    pub ident: Token,
    #[serde(default)]
    pub subscripts: Vec<Subscript>,
    #[serde(default)]
    pub modification: Option<Modification>,
    /// `if expr` conditional declaration.
    #[serde(default)]
    pub condition: Option<Expression>,
    #[serde(default)]
    pub description: Description,
}

//-----------------------------------------------------------------------------
// Modifications
//-----------------------------------------------------------------------------

/// `(argument, argument, ...)`
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModification {
    pub arguments: Vec<ModificationArgument>,
}

/// Optional class modification plus optional `= expr` / `:= expr`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default)]
    pub class_modification: Option<ClassModification>,
    #[serde(default)]
    pub expression: Option<Expression>,
    /// True for the `:=` binding form.
    #[serde(default)]
    pub assign: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ModificationArgument {
    #[serde(rename = "ElementModification")]
    ElementModification {
        #[serde(default)]
        each: bool,
        #[serde(default)]
        is_final: bool,
        name: Name,
        #[serde(default)]
        modification: Option<Modification>,
        #[serde(default)]
        description: Description,
    },
    #[serde(rename = "ElementRedeclaration")]
    ElementRedeclaration {
        #[serde(default)]
        each: bool,
        #[serde(default)]
        is_final: bool,
        element: Box<Element>,
    },
}

//-----------------------------------------------------------------------------
// Equations and statements
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationBranch {
    pub condition: Expression,
    pub equations: Vec<Equation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementBranch {
    pub condition: Expression,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForIndex {
    pub ident: Token,
    #[serde(default)]
    pub range: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Equation {
    #[serde(rename = "SimpleEquation")]
    Simple { lhs: Expression, rhs: Expression },
    #[serde(rename = "ConnectEquation")]
    Connect {
        lhs: ComponentReference,
        rhs: ComponentReference,
    },
    #[serde(rename = "ForEquation")]
    For {
        indices: Vec<ForIndex>,
        equations: Vec<Equation>,
    },
    #[serde(rename = "IfEquation")]
    If {
        branches: Vec<EquationBranch>,
        #[serde(default)]
        else_equations: Vec<Equation>,
    },
    #[serde(rename = "WhenEquation")]
    When { branches: Vec<EquationBranch> },
    /// A bare call equation such as `assert(x > 0, "positive")`.
    #[serde(rename = "CallEquation")]
    Call {
        callee: ComponentReference,
        args: Vec<FunctionArgument>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Statement {
    #[serde(rename = "AssignmentStatement")]
    Assignment {
        target: ComponentReference,
        value: Expression,
    },
    #[serde(rename = "CallStatement")]
    Call {
        callee: ComponentReference,
        args: Vec<FunctionArgument>,
    },
    #[serde(rename = "IfStatement")]
    If {
        branches: Vec<StatementBranch>,
        #[serde(default)]
        else_statements: Vec<Statement>,
    },
    #[serde(rename = "ForStatement")]
    For {
        indices: Vec<ForIndex>,
        statements: Vec<Statement>,
    },
    #[serde(rename = "WhileStatement")]
    While {
        condition: Expression,
        statements: Vec<Statement>,
    },
    #[serde(rename = "WhenStatement")]
    When { branches: Vec<StatementBranch> },
    #[serde(rename = "ReturnStatement")]
    Return,
    #[serde(rename = "BreakStatement")]
    Break,
}

//-----------------------------------------------------------------------------
// Expressions
//-----------------------------------------------------------------------------

/// Binary operator, spelled as in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "or")]
    Or,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = ".+")]
    ElemAdd,
    #[serde(rename = ".-")]
    ElemSub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = ".*")]
    ElemMul,
    #[serde(rename = "./")]
    ElemDiv,
    #[serde(rename = "^")]
    Pow,
    #[serde(rename = ".^")]
    ElemPow,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "<>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::ElemAdd => ".+",
            BinaryOp::ElemSub => ".-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::ElemMul => ".*",
            BinaryOp::ElemDiv => "./",
            BinaryOp::Pow => "^",
            BinaryOp::ElemPow => ".^",
        };
        write!(f, "{}", s)
    }
}

/// Unary operator, spelled as in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "not")]
    Not,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = ".-")]
    ElemMinus,
    #[serde(rename = ".+")]
    ElemPlus,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "not",
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::ElemMinus => ".-",
            UnaryOp::ElemPlus => ".+",
        };
        write!(f, "{}", s)
    }
}

/// One part of a component reference: identifier plus subscripts.
#[derive(Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefPart {
    pub ident: Token,
    #[serde(default)]
    pub subscripts: Vec<Subscript>,
}

impl Debug for RefPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subscripts.is_empty() {
            write!(f, "{}", self.ident.text)
        } else {
            write!(f, "{}[..{}]", self.ident.text, self.subscripts.len())
        }
    }
}

/// A dotted, possibly subscripted reference such as `a.b[1].c`.
#[derive(Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentReference {
    /// Leading `.` — lookup starts from the root scope.
    #[serde(default)]
    pub global: bool,
    pub parts: Vec<RefPart>,
}

impl ComponentReference {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ComponentReference {
            global: false,
            parts: parts
                .into_iter()
                .map(|p| RefPart {
                    ident: Token::synthetic(p),
                    subscripts: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn head(&self) -> Option<&str> {
        self.parts.first().map(|p| p.ident.text.as_str())
    }

    pub fn last(&self) -> Option<&str> {
        self.parts.last().map(|p| p.ident.text.as_str())
    }

    pub fn as_dotted(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.ident.text.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Debug for ComponentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = Vec::new();
        for part in &self.parts {
            s.push(format!("{:?}", part));
        }
        write!(f, "{:?}", s.join("."))
    }
}

impl Display for ComponentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global {
            write!(f, ".")?;
        }
        write!(f, "{}", self.as_dotted())
    }
}

/// An array subscript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Subscript {
    /// The flexible subscript `:`.
    #[serde(rename = "ColonSubscript")]
    Colon,
    #[serde(rename = "ExpressionSubscript")]
    Expression { expression: Expression },
}

/// A positional or named function-call argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionArgument {
    #[serde(default)]
    pub name: Option<Token>,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionBranch {
    pub condition: Expression,
    pub then: Expression,
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Expression {
    #[serde(rename = "BinaryExpression")]
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    #[serde(rename = "UnaryExpression")]
    Unary { op: UnaryOp, operand: Box<Expression> },
    #[serde(rename = "RangeExpression")]
    Range {
        start: Box<Expression>,
        #[serde(default)]
        step: Option<Box<Expression>>,
        end: Box<Expression>,
    },
    #[serde(rename = "IfExpression")]
    If {
        branches: Vec<ExpressionBranch>,
        else_expression: Box<Expression>,
    },
    #[serde(rename = "FunctionCall")]
    Call {
        callee: ComponentReference,
        args: Vec<FunctionArgument>,
    },
    /// `{e1, e2, ...}`
    #[serde(rename = "ArrayConstructor")]
    Array { elements: Vec<Expression> },
    /// `[e11, e12; e21, e22]`
    #[serde(rename = "ArrayConcatenation")]
    Matrix { rows: Vec<Vec<Expression>> },
    #[serde(rename = "ComponentReference")]
    Ref(ComponentReference),
    #[serde(rename = "UNSIGNED_INTEGER")]
    Integer { token: Token },
    #[serde(rename = "UNSIGNED_REAL")]
    Real { token: Token },
    #[serde(rename = "STRING")]
    Str { token: Token },
    #[serde(rename = "BOOLEAN")]
    Boolean { token: Token },
    /// The `end` subscript expression.
    #[serde(rename = "EndExpression")]
    End,
}

impl Expression {
    pub fn integer(value: i64) -> Self {
        Expression::Integer {
            token: Token::synthetic(value.to_string()),
        }
    }

    pub fn real(text: impl Into<String>) -> Self {
        Expression::Real {
            token: Token::synthetic(text),
        }
    }

    pub fn string(text: impl Into<String>) -> Self {
        Expression::Str {
            token: Token::synthetic(text),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Boolean {
            token: Token::synthetic(if value { "true" } else { "false" }),
        }
    }

    /// The literal value if this is an integer literal.
    pub fn integer_value(&self) -> Option<i64> {
        match self {
            Expression::Integer { token } => token.text.parse().ok(),
            Expression::Unary {
                op: UnaryOp::Minus,
                operand,
            } => operand.integer_value().map(|v| -v),
            _ => None,
        }
    }

    /// The literal value if this is a real (or integer) literal.
    pub fn real_value(&self) -> Option<f64> {
        match self {
            Expression::Real { token } => token.text.parse().ok(),
            Expression::Integer { token } => token.text.parse().ok(),
            Expression::Unary {
                op: UnaryOp::Minus,
                operand,
            } => operand.real_value().map(|v| -v),
            _ => None,
        }
    }

    /// The unescaped contents if this is a string literal.
    pub fn string_value(&self) -> Option<&str> {
        match self {
            Expression::Str { token } => Some(token.text.as_str()),
            _ => None,
        }
    }

    pub fn boolean_value(&self) -> Option<bool> {
        match self {
            Expression::Boolean { token } => match token.text.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// The `i`-th of `n` slices of this expression along its first axis.
    ///
    /// Array constructors yield their `i`-th element; anything else yields a
    /// clone of itself, so scalars distribute over every slice.
    pub fn split(&self, n: usize, i: usize) -> Expression {
        debug_assert!(i < n);
        match self {
            Expression::Array { elements } if elements.len() == n => elements[i].clone(),
            _ => self.clone(),
        }
    }
}

impl Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Binary { op, lhs, rhs } => f
                .debug_struct(&format!("{:?}", op))
                .field("lhs", lhs)
                .field("rhs", rhs)
                .finish(),
            Expression::Unary { op, operand } => f
                .debug_struct(&format!("{:?}", op))
                .field("operand", operand)
                .finish(),
            Expression::Range { start, step, end } => f
                .debug_struct("Range")
                .field("start", start)
                .field("step", step)
                .field("end", end)
                .finish(),
            Expression::If {
                branches,
                else_expression,
            } => f
                .debug_struct("If")
                .field("branches", branches)
                .field("else", else_expression)
                .finish(),
            Expression::Call { callee, args } => f
                .debug_struct("Call")
                .field("callee", callee)
                .field("args", args)
                .finish(),
            Expression::Array { elements } => f.debug_list().entries(elements.iter()).finish(),
            Expression::Matrix { rows } => f.debug_list().entries(rows.iter()).finish(),
            Expression::Ref(cref) => write!(f, "{:?}", cref),
            Expression::Integer { token } => write!(f, "Integer({:?})", token),
            Expression::Real { token } => write!(f, "Real({:?})", token),
            Expression::Str { token } => write!(f, "String({:?})", token),
            Expression::Boolean { token } => write!(f, "Boolean({:?})", token),
            Expression::End => write!(f, "End"),
        }
    }
}

//-----------------------------------------------------------------------------
// Tagged-record factory
//-----------------------------------------------------------------------------

/// Reconstructs a node from its serialised `{"@type": ...}` shape.
///
/// The node family is chosen by the target type; an unknown or mismatched tag
/// fails with [`crate::errors::Error::InvalidNode`].
pub fn from_tagged_value<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> crate::errors::Result<T> {
    let tag = value
        .get("@type")
        .and_then(|t| t.as_str())
        .map(str::to_string);
    serde_json::from_value(value).map_err(|e| crate::errors::Error::InvalidNode {
        tag: tag.unwrap_or_else(|| "<missing>".to_string()),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Expression {
        Expression::integer(v)
    }

    #[test]
    fn test_name_accessors() {
        let name = Name::from_parts(["Modelica", "Blocks", "Continuous"]);
        assert_eq!(name.as_dotted(), "Modelica.Blocks.Continuous");
        assert_eq!(name.head(), Some("Modelica"));
        assert_eq!(name.last(), Some("Continuous"));
        assert_eq!(name.tail().as_dotted(), "Blocks.Continuous");
    }

    #[test]
    fn test_expression_literal_accessors() {
        assert_eq!(int(42).integer_value(), Some(42));
        assert_eq!(Expression::real("2.5").real_value(), Some(2.5));
        assert_eq!(Expression::boolean(true).boolean_value(), Some(true));
        assert_eq!(
            Expression::string("hello").string_value(),
            Some("hello")
        );
        let neg = Expression::Unary {
            op: UnaryOp::Minus,
            operand: Box::new(int(3)),
        };
        assert_eq!(neg.integer_value(), Some(-3));
    }

    #[test]
    fn test_expression_split() {
        let array = Expression::Array {
            elements: vec![int(1), int(2), int(3)],
        };
        assert_eq!(array.split(3, 0), int(1));
        assert_eq!(array.split(3, 2), int(3));
        // scalars distribute
        assert_eq!(int(7).split(3, 1), int(7));
    }

    #[test]
    fn test_expression_tagged_roundtrip() {
        let expr = Expression::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(int(1)),
            rhs: Box::new(Expression::real("2.0")),
        };
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(value["@type"], "BinaryExpression");
        assert_eq!(value["lhs"]["@type"], "UNSIGNED_INTEGER");
        let back: Expression = from_tagged_value(value).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn test_token_tagged_shape() {
        let token = Token::synthetic("x");
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["@type"], "IDENT");
        assert_eq!(value["text"], "x");
        let back: Token = serde_json::from_value(value).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_invalid_tag_is_rejected() {
        let value = serde_json::json!({"@type": "NoSuchNode", "lhs": 1});
        let result: crate::errors::Result<Expression> = from_tagged_value(value);
        assert!(matches!(
            result,
            Err(crate::errors::Error::InvalidNode { .. })
        ));
    }

    #[test]
    fn test_class_kind_spelling() {
        assert_eq!(ClassKind::OperatorRecord.to_string(), "operator record");
        assert_eq!(
            serde_json::to_value(ClassKind::ExpandableConnector).unwrap(),
            serde_json::json!("expandable connector")
        );
    }
}
