//! Recursive-descent grammar over the lexed token stream.
//!
//! Each `parse_*` function mirrors one production of the Modelica concrete
//! grammar and builds the corresponding [`crate::syntax::ast`] node. The
//! cursor never backtracks more than one token of lookahead (`nth`).

use crate::errors::{Error, Result};
use crate::parser::lexer::{Lexed, Lexeme, Tok, lex};
use crate::syntax::ast::*;

pub(crate) struct Cursor<'a> {
    source: &'a str,
    lexed: Lexed,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(source: &'a str, file_name: &str) -> Result<Self> {
        let lexed = lex(source, file_name)?;
        Ok(Cursor {
            source,
            lexed,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<Tok> {
        self.lexed.lexemes.get(self.pos).map(|l| l.tok)
    }

    fn nth(&self, k: usize) -> Option<Tok> {
        self.lexed.lexemes.get(self.pos + k).map(|l| l.tok)
    }

    fn at(&self, tok: Tok) -> bool {
        self.peek() == Some(tok)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lexed.lexemes.len()
    }

    fn bump(&mut self) -> Lexeme {
        let lexeme = self.lexed.lexemes[self.pos].clone();
        self.pos += 1;
        lexeme
    }

    fn eat(&mut self, tok: Tok) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<Lexeme> {
        if self.at(tok) {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!("expected {}", what)))
        }
    }

    fn error_here(&self, message: String) -> Error {
        let (start, len) = match self.lexed.lexemes.get(self.pos) {
            Some(l) => (l.start, (l.end - l.start).max(1)),
            None => (self.source.len(), 1),
        };
        Error::Parse {
            src: self.source.to_string(),
            span: (start, len).into(),
            message,
        }
    }

    fn token(&self, lexeme: &Lexeme) -> Token {
        Token {
            text: lexeme.text.clone(),
            location: self.lexed.location(lexeme.start, lexeme.end),
        }
    }

    fn ident(&mut self) -> Result<Token> {
        let lexeme = self.expect(Tok::Ident, "an identifier")?;
        Ok(self.token(&lexeme))
    }

    //-------------------------------------------------------------------------
    // Names and type specifiers
    //-------------------------------------------------------------------------

    fn parse_name(&mut self) -> Result<Name> {
        let mut parts = vec![self.ident()?];
        while self.at(Tok::Dot) && self.nth(1) == Some(Tok::Ident) {
            self.bump();
            parts.push(self.ident()?);
        }
        Ok(Name { parts })
    }

    fn parse_type_specifier(&mut self) -> Result<TypeSpecifier> {
        let global = self.at(Tok::Dot) && self.nth(1) == Some(Tok::Ident) && self.eat(Tok::Dot);
        let name = self.parse_name()?;
        Ok(TypeSpecifier { global, name })
    }

    //-------------------------------------------------------------------------
    // Stored definitions, class definitions, class specifiers
    //-------------------------------------------------------------------------

    pub(crate) fn parse_stored_definition(&mut self) -> Result<StoredDefinition> {
        let mut within = None;
        if self.eat(Tok::Within) {
            if self.at(Tok::Ident) {
                within = Some(self.parse_name()?);
            } else {
                within = Some(Name::default());
            }
            self.expect(Tok::Semicolon, "';' after within clause")?;
        }
        let mut classes = Vec::new();
        while !self.at_end() {
            classes.push(self.parse_class_definition()?);
            self.expect(Tok::Semicolon, "';' after class definition")?;
        }
        Ok(StoredDefinition { within, classes })
    }

    pub(crate) fn parse_class_definition(&mut self) -> Result<ClassDefinition> {
        let mut class = ClassDefinition::default();
        loop {
            match self.peek() {
                Some(Tok::Encapsulated) => {
                    self.bump();
                    class.is_encapsulated = true;
                }
                Some(Tok::Partial) => {
                    self.bump();
                    class.is_partial = true;
                }
                Some(Tok::Final) => {
                    self.bump();
                    class.is_final = true;
                }
                Some(Tok::Inner) => {
                    self.bump();
                    class.is_inner = true;
                }
                Some(Tok::Outer) => {
                    self.bump();
                    class.is_outer = true;
                }
                Some(Tok::Redeclare) => {
                    self.bump();
                    class.is_redeclare = true;
                }
                Some(Tok::Replaceable) => {
                    self.bump();
                    class.is_replaceable = true;
                }
                Some(Tok::Pure) => {
                    self.bump();
                    class.purity = Purity::Pure;
                }
                Some(Tok::Impure) => {
                    self.bump();
                    class.purity = Purity::Impure;
                }
                _ => break,
            }
        }
        class.kind = self.parse_class_kind()?;
        class.specifier = self.parse_class_specifier()?;
        if self.eat(Tok::ConstrainedBy) {
            let type_specifier = self.parse_type_specifier()?;
            let modification = if self.at(Tok::LParen) {
                Some(self.parse_class_modification()?)
            } else {
                None
            };
            class.constraining = Some(ConstrainingClause {
                type_specifier,
                modification,
            });
        }
        Ok(class)
    }

    fn parse_class_kind(&mut self) -> Result<ClassKind> {
        let kind = match self.peek() {
            Some(Tok::Class) => ClassKind::Class,
            Some(Tok::Model) => ClassKind::Model,
            Some(Tok::Record) => ClassKind::Record,
            Some(Tok::Block) => ClassKind::Block,
            Some(Tok::Connector) => ClassKind::Connector,
            Some(Tok::Type) => ClassKind::Type,
            Some(Tok::Package) => ClassKind::Package,
            Some(Tok::Function) => ClassKind::Function,
            Some(Tok::Expandable) => {
                self.bump();
                self.expect(Tok::Connector, "'connector' after 'expandable'")?;
                return Ok(ClassKind::ExpandableConnector);
            }
            Some(Tok::Operator) => {
                self.bump();
                if self.eat(Tok::Record) {
                    return Ok(ClassKind::OperatorRecord);
                }
                if self.eat(Tok::Function) {
                    return Ok(ClassKind::OperatorFunction);
                }
                return Ok(ClassKind::Operator);
            }
            _ => return Err(self.error_here("expected a class kind".to_string())),
        };
        self.bump();
        Ok(kind)
    }

    fn parse_class_specifier(&mut self) -> Result<ClassSpecifier> {
        let ident = self.ident()?;
        if self.eat(Tok::EqSign) {
            if self.at(Tok::Enumeration) {
                self.bump();
                self.expect(Tok::LParen, "'(' after 'enumeration'")?;
                let mut literals = Vec::new();
                let mut unspecified = false;
                if self.eat(Tok::Colon) {
                    unspecified = true;
                } else if self.at(Tok::Ident) {
                    loop {
                        let lit_ident = self.ident()?;
                        let description = self.parse_description()?;
                        literals.push(EnumerationLiteral {
                            ident: lit_ident,
                            description,
                        });
                        if !self.eat(Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RParen, "')' after enumeration literals")?;
                let description = self.parse_description()?;
                return Ok(ClassSpecifier::Enumeration {
                    ident,
                    literals,
                    unspecified,
                    description,
                });
            }
            if self.at(Tok::Der) {
                self.bump();
                self.expect(Tok::LParen, "'(' after 'der'")?;
                let type_specifier = self.parse_type_specifier()?;
                let mut idents = Vec::new();
                while self.eat(Tok::Comma) {
                    idents.push(self.ident()?);
                }
                self.expect(Tok::RParen, "')' after der specifier")?;
                let description = self.parse_description()?;
                return Ok(ClassSpecifier::Der {
                    ident,
                    type_specifier,
                    idents,
                    description,
                });
            }
            let type_specifier = self.parse_type_specifier()?;
            let subscripts = if self.at(Tok::LBracket) {
                self.parse_array_subscripts()?
            } else {
                Vec::new()
            };
            let modification = if self.at(Tok::LParen) {
                Some(self.parse_class_modification()?)
            } else {
                None
            };
            let description = self.parse_description()?;
            return Ok(ClassSpecifier::Short {
                ident,
                type_specifier,
                subscripts,
                modification,
                description,
            });
        }

        let description = self.parse_description_strings()?;
        let (sections, annotation) = self.parse_composition()?;
        self.expect(Tok::End, "'end'")?;
        let end_lexeme = self.expect(Tok::Ident, "the class name after 'end'")?;
        let end_ident = self.token(&end_lexeme);
        Ok(ClassSpecifier::Long {
            ident,
            description,
            sections,
            annotation,
            end_ident,
        })
    }

    fn parse_composition(&mut self) -> Result<(Vec<Section>, Option<ClassModification>)> {
        let mut sections = Vec::new();
        let mut annotation = None;

        let elements = self.parse_element_list()?;
        if !elements.is_empty() {
            sections.push(Section::Element {
                visibility: Visibility::Public,
                elements,
            });
        }

        loop {
            match self.peek() {
                Some(Tok::Public) => {
                    self.bump();
                    let elements = self.parse_element_list()?;
                    sections.push(Section::Element {
                        visibility: Visibility::Public,
                        elements,
                    });
                }
                Some(Tok::Protected) => {
                    self.bump();
                    let elements = self.parse_element_list()?;
                    sections.push(Section::Element {
                        visibility: Visibility::Protected,
                        elements,
                    });
                }
                Some(Tok::Initial) => {
                    self.bump();
                    if self.eat(Tok::Equation) {
                        let equations = self.parse_equation_list()?;
                        sections.push(Section::Equation {
                            initial: true,
                            equations,
                        });
                    } else {
                        self.expect(Tok::Algorithm, "'equation' or 'algorithm' after 'initial'")?;
                        let statements = self.parse_statement_list()?;
                        sections.push(Section::Algorithm {
                            initial: true,
                            statements,
                        });
                    }
                }
                Some(Tok::Equation) => {
                    self.bump();
                    let equations = self.parse_equation_list()?;
                    sections.push(Section::Equation {
                        initial: false,
                        equations,
                    });
                }
                Some(Tok::Algorithm) => {
                    self.bump();
                    let statements = self.parse_statement_list()?;
                    sections.push(Section::Algorithm {
                        initial: false,
                        statements,
                    });
                }
                Some(Tok::Annotation) => {
                    self.bump();
                    annotation = Some(self.parse_class_modification()?);
                    self.expect(Tok::Semicolon, "';' after annotation")?;
                }
                _ => break,
            }
        }
        Ok((sections, annotation))
    }

    //-------------------------------------------------------------------------
    // Elements
    //-------------------------------------------------------------------------

    fn at_element_start(&self) -> bool {
        !matches!(
            self.peek(),
            None | Some(Tok::Public)
                | Some(Tok::Protected)
                | Some(Tok::Initial)
                | Some(Tok::Equation)
                | Some(Tok::Algorithm)
                | Some(Tok::Annotation)
                | Some(Tok::End)
        )
    }

    fn parse_element_list(&mut self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        while self.at_element_start() {
            elements.push(self.parse_element(false)?);
            self.expect(Tok::Semicolon, "';' after element")?;
        }
        Ok(elements)
    }

    fn parse_element(&mut self, single_declaration: bool) -> Result<Element> {
        if self.eat(Tok::Import) {
            return self.parse_import_clause();
        }
        if self.eat(Tok::Extends) {
            let type_specifier = self.parse_type_specifier()?;
            let modification = if self.at(Tok::LParen) {
                Some(self.parse_class_modification()?)
            } else {
                None
            };
            let annotation = if self.eat(Tok::Annotation) {
                Some(self.parse_class_modification()?)
            } else {
                None
            };
            return Ok(Element::ExtendsClause(ExtendsClause {
                type_specifier,
                modification,
                annotation,
            }));
        }

        let mut is_redeclare = false;
        let mut is_final = false;
        let mut is_inner = false;
        let mut is_outer = false;
        let mut is_replaceable = false;
        loop {
            match self.peek() {
                Some(Tok::Redeclare) => {
                    self.bump();
                    is_redeclare = true;
                }
                Some(Tok::Final) => {
                    self.bump();
                    is_final = true;
                }
                Some(Tok::Inner) => {
                    self.bump();
                    is_inner = true;
                }
                Some(Tok::Outer) => {
                    self.bump();
                    is_outer = true;
                }
                Some(Tok::Replaceable) => {
                    self.bump();
                    is_replaceable = true;
                }
                _ => break,
            }
        }

        if matches!(
            self.peek(),
            Some(Tok::Class)
                | Some(Tok::Model)
                | Some(Tok::Record)
                | Some(Tok::Block)
                | Some(Tok::Connector)
                | Some(Tok::Type)
                | Some(Tok::Package)
                | Some(Tok::Function)
                | Some(Tok::Operator)
                | Some(Tok::Expandable)
                | Some(Tok::Encapsulated)
                | Some(Tok::Partial)
                | Some(Tok::Pure)
                | Some(Tok::Impure)
        ) {
            let mut class = self.parse_class_definition()?;
            class.is_redeclare |= is_redeclare;
            class.is_final |= is_final;
            class.is_inner |= is_inner;
            class.is_outer |= is_outer;
            class.is_replaceable |= is_replaceable;
            return Ok(Element::ClassDefinition(class));
        }

        let mut clause = self.parse_component_clause(single_declaration)?;
        clause.is_redeclare = is_redeclare;
        clause.is_final = is_final;
        clause.is_inner = is_inner;
        clause.is_outer = is_outer;
        clause.is_replaceable = is_replaceable;
        Ok(Element::ComponentClause(clause))
    }

    fn parse_import_clause(&mut self) -> Result<Element> {
        // import X = A.B.C;
        if self.at(Tok::Ident) && self.nth(1) == Some(Tok::EqSign) {
            let alias = self.ident()?;
            self.bump();
            let name = self.parse_name()?;
            self.parse_description()?;
            return Ok(Element::ImportClause(ImportClause {
                alias: Some(alias),
                name,
            }));
        }
        let name = self.parse_name()?;
        if self.eat(Tok::DotStar) {
            self.parse_description()?;
            return Ok(Element::UnqualifiedImportClause(UnqualifiedImportClause {
                name,
            }));
        }
        if self.at(Tok::Dot) && self.nth(1) == Some(Tok::LBrace) {
            self.bump();
            self.bump();
            let mut imports = Vec::new();
            loop {
                imports.push(self.ident()?);
                if !self.eat(Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RBrace, "'}' after import list")?;
            self.parse_description()?;
            return Ok(Element::CompoundImportClause(CompoundImportClause {
                name,
                imports,
            }));
        }
        self.parse_description()?;
        Ok(Element::ImportClause(ImportClause { alias: None, name }))
    }

    fn parse_component_clause(&mut self, single_declaration: bool) -> Result<ComponentClause> {
        let mut clause = ComponentClause::default();
        match self.peek() {
            Some(Tok::Flow) => {
                self.bump();
                clause.flow = Flow::Flow;
            }
            Some(Tok::Stream) => {
                self.bump();
                clause.flow = Flow::Stream;
            }
            _ => {}
        }
        match self.peek() {
            Some(Tok::Discrete) => {
                self.bump();
                clause.variability = Variability::Discrete;
            }
            Some(Tok::Parameter) => {
                self.bump();
                clause.variability = Variability::Parameter;
            }
            Some(Tok::Constant) => {
                self.bump();
                clause.variability = Variability::Constant;
            }
            _ => {}
        }
        match self.peek() {
            Some(Tok::Input) => {
                self.bump();
                clause.causality = Causality::Input;
            }
            Some(Tok::Output) => {
                self.bump();
                clause.causality = Causality::Output;
            }
            _ => {}
        }
        clause.type_specifier = self.parse_type_specifier()?;
        if self.at(Tok::LBracket) {
            clause.subscripts = self.parse_array_subscripts()?;
        }
        loop {
            clause.declarations.push(self.parse_component_declaration()?);
            if single_declaration || !self.eat(Tok::Comma) {
                break;
            }
        }
        Ok(clause)
    }

    fn parse_component_declaration(&mut self) -> Result<ComponentDeclaration> {
        let ident = self.ident()?;
        let subscripts = if self.at(Tok::LBracket) {
            self.parse_array_subscripts()?
        } else {
            Vec::new()
        };
        let modification = if self.at(Tok::LParen) || self.at(Tok::EqSign) || self.at(Tok::Assign) {
            Some(self.parse_modification()?)
        } else {
            None
        };
        let condition = if self.eat(Tok::If) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let description = self.parse_description()?;
        Ok(ComponentDeclaration {
            ident,
            subscripts,
            modification,
            condition,
            description,
        })
    }

    //-------------------------------------------------------------------------
    // Modifications
    //-------------------------------------------------------------------------

    fn parse_modification(&mut self) -> Result<Modification> {
        let class_modification = if self.at(Tok::LParen) {
            Some(self.parse_class_modification()?)
        } else {
            None
        };
        let mut expression = None;
        let mut assign = false;
        if self.eat(Tok::EqSign) {
            expression = Some(self.parse_expression()?);
        } else if self.eat(Tok::Assign) {
            expression = Some(self.parse_expression()?);
            assign = true;
        }
        Ok(Modification {
            class_modification,
            expression,
            assign,
        })
    }

    pub(crate) fn parse_class_modification(&mut self) -> Result<ClassModification> {
        self.expect(Tok::LParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.at(Tok::RParen) {
            loop {
                arguments.push(self.parse_modification_argument()?);
                if !self.eat(Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')' after modification arguments")?;
        Ok(ClassModification { arguments })
    }

    fn parse_modification_argument(&mut self) -> Result<ModificationArgument> {
        let mut each = self.eat(Tok::Each);
        let mut is_final = self.eat(Tok::Final);
        if self.at(Tok::Redeclare) || self.at(Tok::Replaceable) {
            let element = self.parse_element(true)?;
            return Ok(ModificationArgument::ElementRedeclaration {
                each,
                is_final,
                element: Box::new(element),
            });
        }
        // tolerate `each`/`final` in either order
        if !each {
            each = self.eat(Tok::Each);
        }
        if !is_final {
            is_final = self.eat(Tok::Final);
        }
        let name = self.parse_name()?;
        let modification = if self.at(Tok::LParen) || self.at(Tok::EqSign) || self.at(Tok::Assign) {
            Some(self.parse_modification()?)
        } else {
            None
        };
        let description = self.parse_description()?;
        Ok(ModificationArgument::ElementModification {
            each,
            is_final,
            name,
            modification,
            description,
        })
    }

    //-------------------------------------------------------------------------
    // Descriptions and subscripts
    //-------------------------------------------------------------------------

    fn parse_description_strings(&mut self) -> Result<Description> {
        let mut strings = Vec::new();
        if self.at(Tok::StringLit) {
            let lexeme = self.bump();
            strings.push(self.token(&lexeme));
            while self.eat(Tok::Plus) {
                let lexeme = self.expect(Tok::StringLit, "a string after '+'")?;
                strings.push(self.token(&lexeme));
            }
        }
        Ok(Description {
            strings,
            annotation: None,
        })
    }

    fn parse_description(&mut self) -> Result<Description> {
        let mut description = self.parse_description_strings()?;
        if self.eat(Tok::Annotation) {
            description.annotation = Some(self.parse_class_modification()?);
        }
        Ok(description)
    }

    fn parse_array_subscripts(&mut self) -> Result<Vec<Subscript>> {
        self.expect(Tok::LBracket, "'['")?;
        let mut subscripts = Vec::new();
        loop {
            if self.at(Tok::Colon)
                && matches!(self.nth(1), Some(Tok::Comma) | Some(Tok::RBracket))
            {
                self.bump();
                subscripts.push(Subscript::Colon);
            } else {
                subscripts.push(Subscript::Expression {
                    expression: self.parse_expression()?,
                });
            }
            if !self.eat(Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBracket, "']' after subscripts")?;
        Ok(subscripts)
    }

    //-------------------------------------------------------------------------
    // Equations and statements
    //-------------------------------------------------------------------------

    fn at_section_boundary(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Tok::Public)
                | Some(Tok::Protected)
                | Some(Tok::Initial)
                | Some(Tok::Equation)
                | Some(Tok::Algorithm)
                | Some(Tok::Annotation)
                | Some(Tok::End)
        )
    }

    fn parse_equation_list(&mut self) -> Result<Vec<Equation>> {
        let mut equations = Vec::new();
        while !self.at_section_boundary() {
            equations.push(self.parse_equation()?);
            self.expect(Tok::Semicolon, "';' after equation")?;
        }
        Ok(equations)
    }

    fn parse_equation_block(&mut self) -> Result<Vec<Equation>> {
        // inside if/for/when: stop on the block keywords instead
        let mut equations = Vec::new();
        while !matches!(
            self.peek(),
            None | Some(Tok::End) | Some(Tok::Else) | Some(Tok::ElseIf) | Some(Tok::ElseWhen)
        ) {
            equations.push(self.parse_equation()?);
            self.expect(Tok::Semicolon, "';' after equation")?;
        }
        Ok(equations)
    }

    fn parse_equation(&mut self) -> Result<Equation> {
        match self.peek() {
            Some(Tok::If) => {
                self.bump();
                let mut branches = Vec::new();
                let condition = self.parse_expression()?;
                self.expect(Tok::Then, "'then'")?;
                branches.push(EquationBranch {
                    condition,
                    equations: self.parse_equation_block()?,
                });
                while self.eat(Tok::ElseIf) {
                    let condition = self.parse_expression()?;
                    self.expect(Tok::Then, "'then'")?;
                    branches.push(EquationBranch {
                        condition,
                        equations: self.parse_equation_block()?,
                    });
                }
                let else_equations = if self.eat(Tok::Else) {
                    self.parse_equation_block()?
                } else {
                    Vec::new()
                };
                self.expect(Tok::End, "'end if'")?;
                self.expect(Tok::If, "'if' after 'end'")?;
                Ok(Equation::If {
                    branches,
                    else_equations,
                })
            }
            Some(Tok::For) => {
                self.bump();
                let indices = self.parse_for_indices()?;
                self.expect(Tok::Loop, "'loop'")?;
                let equations = self.parse_equation_block()?;
                self.expect(Tok::End, "'end for'")?;
                self.expect(Tok::For, "'for' after 'end'")?;
                Ok(Equation::For { indices, equations })
            }
            Some(Tok::When) => {
                self.bump();
                let mut branches = Vec::new();
                let condition = self.parse_expression()?;
                self.expect(Tok::Then, "'then'")?;
                branches.push(EquationBranch {
                    condition,
                    equations: self.parse_equation_block()?,
                });
                while self.eat(Tok::ElseWhen) {
                    let condition = self.parse_expression()?;
                    self.expect(Tok::Then, "'then'")?;
                    branches.push(EquationBranch {
                        condition,
                        equations: self.parse_equation_block()?,
                    });
                }
                self.expect(Tok::End, "'end when'")?;
                self.expect(Tok::When, "'when' after 'end'")?;
                Ok(Equation::When { branches })
            }
            Some(Tok::Connect) => {
                self.bump();
                self.expect(Tok::LParen, "'(' after 'connect'")?;
                let lhs = self.parse_component_reference()?;
                self.expect(Tok::Comma, "',' in connect equation")?;
                let rhs = self.parse_component_reference()?;
                self.expect(Tok::RParen, "')' after connect equation")?;
                self.parse_description()?;
                Ok(Equation::Connect { lhs, rhs })
            }
            _ => {
                let lhs = self.parse_simple_expression()?;
                if self.eat(Tok::EqSign) {
                    let rhs = self.parse_expression()?;
                    self.parse_description()?;
                    Ok(Equation::Simple { lhs, rhs })
                } else if let Expression::Call { callee, args } = lhs {
                    self.parse_description()?;
                    Ok(Equation::Call { callee, args })
                } else {
                    Err(self.error_here("expected '=' in equation".to_string()))
                }
            }
        }
    }

    fn parse_for_indices(&mut self) -> Result<Vec<ForIndex>> {
        let mut indices = Vec::new();
        loop {
            let ident = self.ident()?;
            let range = if self.eat(Tok::In) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            indices.push(ForIndex { ident, range });
            if !self.eat(Tok::Comma) {
                break;
            }
        }
        Ok(indices)
    }

    fn parse_statement_list(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        while !self.at_section_boundary() {
            statements.push(self.parse_statement()?);
            self.expect(Tok::Semicolon, "';' after statement")?;
        }
        Ok(statements)
    }

    fn parse_statement_block(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        while !matches!(
            self.peek(),
            None | Some(Tok::End) | Some(Tok::Else) | Some(Tok::ElseIf) | Some(Tok::ElseWhen)
        ) {
            statements.push(self.parse_statement()?);
            self.expect(Tok::Semicolon, "';' after statement")?;
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek() {
            Some(Tok::Return) => {
                self.bump();
                Ok(Statement::Return)
            }
            Some(Tok::Break) => {
                self.bump();
                Ok(Statement::Break)
            }
            Some(Tok::If) => {
                self.bump();
                let mut branches = Vec::new();
                let condition = self.parse_expression()?;
                self.expect(Tok::Then, "'then'")?;
                branches.push(StatementBranch {
                    condition,
                    statements: self.parse_statement_block()?,
                });
                while self.eat(Tok::ElseIf) {
                    let condition = self.parse_expression()?;
                    self.expect(Tok::Then, "'then'")?;
                    branches.push(StatementBranch {
                        condition,
                        statements: self.parse_statement_block()?,
                    });
                }
                let else_statements = if self.eat(Tok::Else) {
                    self.parse_statement_block()?
                } else {
                    Vec::new()
                };
                self.expect(Tok::End, "'end if'")?;
                self.expect(Tok::If, "'if' after 'end'")?;
                Ok(Statement::If {
                    branches,
                    else_statements,
                })
            }
            Some(Tok::For) => {
                self.bump();
                let indices = self.parse_for_indices()?;
                self.expect(Tok::Loop, "'loop'")?;
                let statements = self.parse_statement_block()?;
                self.expect(Tok::End, "'end for'")?;
                self.expect(Tok::For, "'for' after 'end'")?;
                Ok(Statement::For {
                    indices,
                    statements,
                })
            }
            Some(Tok::While) => {
                self.bump();
                let condition = self.parse_expression()?;
                self.expect(Tok::Loop, "'loop'")?;
                let statements = self.parse_statement_block()?;
                self.expect(Tok::End, "'end while'")?;
                self.expect(Tok::While, "'while' after 'end'")?;
                Ok(Statement::While {
                    condition,
                    statements,
                })
            }
            Some(Tok::When) => {
                self.bump();
                let mut branches = Vec::new();
                let condition = self.parse_expression()?;
                self.expect(Tok::Then, "'then'")?;
                branches.push(StatementBranch {
                    condition,
                    statements: self.parse_statement_block()?,
                });
                while self.eat(Tok::ElseWhen) {
                    let condition = self.parse_expression()?;
                    self.expect(Tok::Then, "'then'")?;
                    branches.push(StatementBranch {
                        condition,
                        statements: self.parse_statement_block()?,
                    });
                }
                self.expect(Tok::End, "'end when'")?;
                self.expect(Tok::When, "'when' after 'end'")?;
                Ok(Statement::When { branches })
            }
            _ => {
                let target = self.parse_component_reference()?;
                if self.eat(Tok::Assign) {
                    let value = self.parse_expression()?;
                    self.parse_description()?;
                    Ok(Statement::Assignment { target, value })
                } else if self.at(Tok::LParen) {
                    let args = self.parse_function_arguments()?;
                    self.parse_description()?;
                    Ok(Statement::Call {
                        callee: target,
                        args,
                    })
                } else {
                    Err(self.error_here("expected ':=' or '(' in statement".to_string()))
                }
            }
        }
    }

    //-------------------------------------------------------------------------
    // Expressions
    //-------------------------------------------------------------------------

    pub(crate) fn parse_expression(&mut self) -> Result<Expression> {
        if self.eat(Tok::If) {
            let mut branches = Vec::new();
            let condition = self.parse_expression()?;
            self.expect(Tok::Then, "'then'")?;
            let then = self.parse_expression()?;
            branches.push(ExpressionBranch { condition, then });
            while self.eat(Tok::ElseIf) {
                let condition = self.parse_expression()?;
                self.expect(Tok::Then, "'then'")?;
                let then = self.parse_expression()?;
                branches.push(ExpressionBranch { condition, then });
            }
            self.expect(Tok::Else, "'else' in if-expression")?;
            let else_expression = Box::new(self.parse_expression()?);
            return Ok(Expression::If {
                branches,
                else_expression,
            });
        }
        self.parse_simple_expression()
    }

    fn parse_simple_expression(&mut self) -> Result<Expression> {
        let start = self.parse_logical()?;
        if self.at(Tok::Colon) {
            self.bump();
            let second = self.parse_logical()?;
            if self.eat(Tok::Colon) {
                let end = self.parse_logical()?;
                return Ok(Expression::Range {
                    start: Box::new(start),
                    step: Some(Box::new(second)),
                    end: Box::new(end),
                });
            }
            return Ok(Expression::Range {
                start: Box::new(start),
                step: None,
                end: Box::new(second),
            });
        }
        Ok(start)
    }

    fn parse_logical(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_logical_term()?;
        while self.eat(Tok::Or) {
            let rhs = self.parse_logical_term()?;
            lhs = Expression::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_term(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_logical_factor()?;
        while self.eat(Tok::And) {
            let rhs = self.parse_logical_factor()?;
            lhs = Expression::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_factor(&mut self) -> Result<Expression> {
        if self.eat(Tok::Not) {
            let operand = self.parse_relation()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_relation()
    }

    fn parse_relation(&mut self) -> Result<Expression> {
        let lhs = self.parse_arithmetic()?;
        let op = match self.peek() {
            Some(Tok::Lt) => BinaryOp::Lt,
            Some(Tok::Le) => BinaryOp::Le,
            Some(Tok::Gt) => BinaryOp::Gt,
            Some(Tok::Ge) => BinaryOp::Ge,
            Some(Tok::EqEq) => BinaryOp::Eq,
            Some(Tok::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_arithmetic()?;
        Ok(Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_arithmetic(&mut self) -> Result<Expression> {
        let leading = match self.peek() {
            Some(Tok::Plus) => Some(UnaryOp::Plus),
            Some(Tok::Minus) => Some(UnaryOp::Minus),
            Some(Tok::DotPlus) => Some(UnaryOp::ElemPlus),
            Some(Tok::DotMinus) => Some(UnaryOp::ElemMinus),
            _ => None,
        };
        if leading.is_some() {
            self.bump();
        }
        let mut lhs = self.parse_term()?;
        if let Some(op) = leading {
            lhs = Expression::Unary {
                op,
                operand: Box::new(lhs),
            };
        }
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                Some(Tok::DotPlus) => BinaryOp::ElemAdd,
                Some(Tok::DotMinus) => BinaryOp::ElemSub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::DotStar) => BinaryOp::ElemMul,
                Some(Tok::DotSlash) => BinaryOp::ElemDiv,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_factor()?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(Tok::Caret) => BinaryOp::Pow,
            Some(Tok::DotCaret) => BinaryOp::ElemPow,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_primary()?;
        Ok(Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Tok::UnsignedInteger) => {
                let lexeme = self.bump();
                Ok(Expression::Integer {
                    token: self.token(&lexeme),
                })
            }
            Some(Tok::UnsignedReal) => {
                let lexeme = self.bump();
                Ok(Expression::Real {
                    token: self.token(&lexeme),
                })
            }
            Some(Tok::StringLit) => {
                let lexeme = self.bump();
                Ok(Expression::Str {
                    token: self.token(&lexeme),
                })
            }
            Some(Tok::True) | Some(Tok::False) => {
                let lexeme = self.bump();
                Ok(Expression::Boolean {
                    token: self.token(&lexeme),
                })
            }
            Some(Tok::End) => {
                self.bump();
                Ok(Expression::End)
            }
            Some(Tok::LParen) => {
                self.bump();
                let inner = self.parse_expression()?;
                if self.at(Tok::Comma) {
                    return Err(
                        self.error_here("tuple expressions are not supported".to_string())
                    );
                }
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::LBrace) => {
                self.bump();
                let mut elements = Vec::new();
                if !self.at(Tok::RBrace) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if self.at(Tok::For) {
                            return Err(self.error_here(
                                "array comprehensions are not supported".to_string(),
                            ));
                        }
                        if !self.eat(Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBrace, "'}' after array elements")?;
                Ok(Expression::Array { elements })
            }
            Some(Tok::LBracket) => {
                self.bump();
                let mut rows = Vec::new();
                loop {
                    let mut row = Vec::new();
                    loop {
                        row.push(self.parse_expression()?);
                        if !self.eat(Tok::Comma) {
                            break;
                        }
                    }
                    rows.push(row);
                    if !self.eat(Tok::Semicolon) {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']' after matrix rows")?;
                Ok(Expression::Matrix { rows })
            }
            Some(Tok::Der) => {
                let lexeme = self.bump();
                let callee = ComponentReference {
                    global: false,
                    parts: vec![RefPart {
                        ident: self.token(&lexeme),
                        subscripts: Vec::new(),
                    }],
                };
                let args = self.parse_function_arguments()?;
                Ok(Expression::Call { callee, args })
            }
            Some(Tok::Initial) => {
                let lexeme = self.bump();
                let callee = ComponentReference {
                    global: false,
                    parts: vec![RefPart {
                        ident: self.token(&lexeme),
                        subscripts: Vec::new(),
                    }],
                };
                let args = self.parse_function_arguments()?;
                Ok(Expression::Call { callee, args })
            }
            Some(Tok::Ident) | Some(Tok::Dot) => {
                let cref = self.parse_component_reference()?;
                if self.at(Tok::LParen) {
                    let args = self.parse_function_arguments()?;
                    Ok(Expression::Call { callee: cref, args })
                } else {
                    Ok(Expression::Ref(cref))
                }
            }
            _ => Err(self.error_here("expected an expression".to_string())),
        }
    }

    fn parse_function_arguments(&mut self) -> Result<Vec<FunctionArgument>> {
        self.expect(Tok::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(Tok::RParen) {
            loop {
                let name = if self.at(Tok::Ident) && self.nth(1) == Some(Tok::EqSign) {
                    let token = self.ident()?;
                    self.bump();
                    Some(token)
                } else {
                    None
                };
                let value = self.parse_expression()?;
                args.push(FunctionArgument { name, value });
                if !self.eat(Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')' after arguments")?;
        Ok(args)
    }

    pub(crate) fn parse_component_reference(&mut self) -> Result<ComponentReference> {
        let global = self.at(Tok::Dot) && self.nth(1) == Some(Tok::Ident) && self.eat(Tok::Dot);
        let mut parts = Vec::new();
        loop {
            let ident = self.ident()?;
            let subscripts = if self.at(Tok::LBracket) {
                self.parse_array_subscripts()?
            } else {
                Vec::new()
            };
            parts.push(RefPart { ident, subscripts });
            if self.at(Tok::Dot) && self.nth(1) == Some(Tok::Ident) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(ComponentReference { global, parts })
    }

    pub(crate) fn expect_eof(&mut self) -> Result<()> {
        self.eat(Tok::Semicolon);
        if !self.at_end() {
            return Err(self.error_here("unexpected trailing input".to_string()));
        }
        Ok(())
    }
}
