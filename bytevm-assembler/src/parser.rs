//! Parser: token stream to statements.
//!
//! Instructions whose absolute-address operands may name a label are parsed
//! into `ProtoInstruction` variants and resolved after pass one has
//! assigned every label an address; everything else parses straight into
//! the final `Instruction`.

use crate::error::{AssemblerError, Result};
use crate::lexer::{Spanned, Token};
use bytevm_spec::register::codes;
use bytevm_spec::{Instruction, Opcode, Reg, Width};
use std::collections::HashMap;

/// An absolute-address operand, possibly still symbolic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrRef {
    Absolute(u64),
    Label(String),
}

impl AddrRef {
    fn resolve(&self, labels: &HashMap<String, u64>, line: usize) -> Result<u64> {
        match self {
            AddrRef::Absolute(addr) => Ok(*addr),
            AddrRef::Label(name) => {
                labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| AssemblerError::UnknownLabel {
                        line,
                        name: name.clone(),
                    })
            }
        }
    }
}

/// An instruction that may still contain unresolved label references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoInstruction {
    Ready(Instruction),
    Jmp(AddrRef),
    Jz(AddrRef),
    Call(AddrRef),
    Readc { dst: Reg, addr: AddrRef },
    Readcs { size: u32, addr: AddrRef },
    Writec { addr: AddrRef, src: Reg },
    Writecs { addr: AddrRef, size: u32 },
    Copyc { dst: AddrRef, size: u32, src: AddrRef },
    /// `loadi` with a label: materializes the address as an 8-byte
    /// immediate.
    LoadiAddr { dst: Reg, addr: AddrRef },
}

impl ProtoInstruction {
    /// Encoded length; known before label resolution because address
    /// operands are always 8 bytes.
    pub fn encoded_len(&self) -> u64 {
        match self {
            ProtoInstruction::Ready(inst) => inst.encoded_len(),
            ProtoInstruction::Jmp(_) | ProtoInstruction::Jz(_) | ProtoInstruction::Call(_) => 9,
            ProtoInstruction::Readc { .. } | ProtoInstruction::Writec { .. } => 10,
            ProtoInstruction::Readcs { .. } | ProtoInstruction::Writecs { .. } => 13,
            ProtoInstruction::Copyc { .. } => 21,
            ProtoInstruction::LoadiAddr { .. } => 14,
        }
    }

    /// Substitute label addresses to produce the final instruction.
    pub fn resolve(self, labels: &HashMap<String, u64>, line: usize) -> Result<Instruction> {
        Ok(match self {
            ProtoInstruction::Ready(inst) => inst,
            ProtoInstruction::Jmp(addr) => Instruction::Jmp {
                addr: addr.resolve(labels, line)?,
            },
            ProtoInstruction::Jz(addr) => Instruction::Jz {
                addr: addr.resolve(labels, line)?,
            },
            ProtoInstruction::Call(addr) => Instruction::Call {
                addr: addr.resolve(labels, line)?,
            },
            ProtoInstruction::Readc { dst, addr } => Instruction::Readc {
                dst,
                addr: addr.resolve(labels, line)?,
            },
            ProtoInstruction::Readcs { size, addr } => Instruction::Readcs {
                size,
                addr: addr.resolve(labels, line)?,
            },
            ProtoInstruction::Writec { addr, src } => Instruction::Writec {
                addr: addr.resolve(labels, line)?,
                src,
            },
            ProtoInstruction::Writecs { addr, size } => Instruction::Writecs {
                addr: addr.resolve(labels, line)?,
                size,
            },
            ProtoInstruction::Copyc { dst, size, src } => Instruction::Copyc {
                dst: dst.resolve(labels, line)?,
                size,
                src: src.resolve(labels, line)?,
            },
            ProtoInstruction::LoadiAddr { dst, addr } => Instruction::Loadi {
                dst,
                value: addr.resolve(labels, line)?.to_le_bytes().to_vec(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Label(String),
    Inst(ProtoInstruction),
    /// `.org`: continue assembly at the given address.
    Org(u64),
    /// Raw data emitted by `.byte`, `.quad`, `.zero`.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// Parse a register operand: `r0`..`r63` or a named alias, with an
/// optional `.b`/`.h`/`.w`/`.q` width suffix. Bare names use the
/// register's natural width.
pub fn parse_register(name: &str, line: usize) -> Result<Reg> {
    let unknown = || AssemblerError::UnknownRegister {
        line,
        name: name.to_string(),
    };

    let (base, suffix) = match name.rsplit_once('.') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (name, None),
    };

    let code = match base {
        "ax" => codes::AX,
        "ip" => codes::IP,
        "sp" => codes::SP,
        "fp" => codes::FP,
        "flags" => codes::FLAGS,
        "run" => codes::RUN,
        "ext" => codes::EXT,
        _ => {
            let digits = base.strip_prefix('r').ok_or_else(unknown)?;
            let code: u8 = digits.parse().map_err(|_| unknown())?;
            if code >= 64 {
                return Err(unknown());
            }
            code
        }
    };

    let width = match suffix {
        None => Reg::natural_width(code),
        Some("b") => Width::Byte,
        Some("h") => Width::Half,
        Some("w") => Width::Word,
        Some("q") => Width::Quad,
        Some(_) => return Err(unknown()),
    };

    Ok(Reg::new(code, width))
}

/// Encode a numeric immediate as `size` little-endian bytes, checking it
/// fits in that many bytes as either a signed or unsigned value.
fn encode_imm(value: i128, size: usize, line: usize) -> Result<Vec<u8>> {
    let fits = size >= 1
        && size <= 8
        && value >= -(1i128 << (size * 8 - 1))
        && value < (1i128 << (size * 8));
    if !fits {
        return Err(AssemblerError::ValueRange { line, value, width: size });
    }
    Ok((value as u64).to_le_bytes()[..size].to_vec())
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_second(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> AssemblerError {
        AssemblerError::UnexpectedToken {
            line: self.line(),
            found: self.peek().to_string(),
            expected,
        }
    }

    fn expect_comma(&mut self) -> Result<()> {
        match self.peek() {
            Token::Comma => {
                self.bump();
                Ok(())
            }
            _ => Err(self.unexpected("','")),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Token::Identifier(_) => match self.bump() {
                Token::Identifier(name) => Ok(name),
                _ => unreachable!(),
            },
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn number(&mut self) -> Result<i128> {
        match self.peek() {
            Token::Number(_) => match self.bump() {
                Token::Number(value) => Ok(value),
                _ => unreachable!(),
            },
            _ => Err(self.unexpected("a number")),
        }
    }

    fn register(&mut self) -> Result<Reg> {
        let line = self.line();
        let name = self.ident()?;
        parse_register(&name, line)
    }

    fn size(&mut self) -> Result<u32> {
        let line = self.line();
        let value = self.number()?;
        if value < 0 || value > u32::MAX as i128 {
            return Err(AssemblerError::ValueRange { line, value, width: 4 });
        }
        Ok(value as u32)
    }

    fn offset(&mut self) -> Result<i64> {
        let line = self.line();
        let value = self.number()?;
        if value < i64::MIN as i128 || value > i64::MAX as i128 {
            return Err(AssemblerError::ValueRange { line, value, width: 8 });
        }
        Ok(value as i64)
    }

    /// A number or a label reference in an absolute-address position.
    fn addr(&mut self) -> Result<AddrRef> {
        match self.peek() {
            Token::Number(_) => {
                let line = self.line();
                let value = self.number()?;
                if value < 0 || value > u64::MAX as i128 {
                    return Err(AssemblerError::ValueRange { line, value, width: 8 });
                }
                Ok(AddrRef::Absolute(value as u64))
            }
            Token::Identifier(_) => Ok(AddrRef::Label(self.ident()?)),
            _ => Err(self.unexpected("an address or label")),
        }
    }

    fn end_of_line(&mut self) -> Result<()> {
        match self.peek() {
            Token::Newline => {
                self.bump();
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    /// Parse the whole token stream into statements.
    pub fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();

        loop {
            match self.peek() {
                Token::Newline => {
                    self.bump();
                }
                Token::Eof => break,
                Token::Directive(_) => {
                    let line = self.line();
                    let kind = self.parse_directive()?;
                    self.end_of_line()?;
                    stmts.push(Stmt { line, kind });
                }
                Token::Identifier(_) => {
                    let line = self.line();
                    if matches!(self.peek_second(), Token::Colon) {
                        let name = self.ident()?;
                        self.bump(); // colon
                        stmts.push(Stmt { line, kind: StmtKind::Label(name) });
                    } else {
                        let inst = self.parse_instruction()?;
                        self.end_of_line()?;
                        stmts.push(Stmt { line, kind: StmtKind::Inst(inst) });
                    }
                }
                _ => return Err(self.unexpected("a mnemonic, label, or directive")),
            }
        }

        Ok(stmts)
    }

    fn parse_directive(&mut self) -> Result<StmtKind> {
        let line = self.line();
        let name = match self.bump() {
            Token::Directive(name) => name,
            _ => unreachable!(),
        };

        match name.as_str() {
            "org" => {
                let value = self.number()?;
                if value < 0 || value > u64::MAX as i128 {
                    return Err(AssemblerError::ValueRange { line, value, width: 8 });
                }
                Ok(StmtKind::Org(value as u64))
            }
            "byte" => {
                let mut bytes = Vec::new();
                loop {
                    let line = self.line();
                    bytes.extend(encode_imm(self.number()?, 1, line)?);
                    if matches!(self.peek(), Token::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(StmtKind::Bytes(bytes))
            }
            "quad" => {
                let mut bytes = Vec::new();
                loop {
                    let line = self.line();
                    bytes.extend(encode_imm(self.number()?, 8, line)?);
                    if matches!(self.peek(), Token::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(StmtKind::Bytes(bytes))
            }
            "zero" => {
                let count = self.number()?;
                if count < 0 || count > u32::MAX as i128 {
                    return Err(AssemblerError::ValueRange { line, value: count, width: 4 });
                }
                Ok(StmtKind::Bytes(vec![0; count as usize]))
            }
            _ => Err(AssemblerError::UnknownDirective { line, name }),
        }
    }

    fn parse_instruction(&mut self) -> Result<ProtoInstruction> {
        let line = self.line();
        let name = self.ident()?;
        let (base, suffix) = match name.rsplit_once('.') {
            Some((base, suffix)) => (base, Some(suffix.to_string())),
            None => (name.as_str(), None),
        };

        let opcode = Opcode::from_mnemonic(base).ok_or_else(|| {
            AssemblerError::UnknownMnemonic { line, name: name.clone() }
        })?;

        // Only `push` takes a mnemonic width suffix.
        let push_width = match (&opcode, suffix.as_deref()) {
            (Opcode::Push, None) => Some(Width::Quad),
            (Opcode::Push, Some("b")) => Some(Width::Byte),
            (Opcode::Push, Some("h")) => Some(Width::Half),
            (Opcode::Push, Some("w")) => Some(Width::Word),
            (Opcode::Push, Some("q")) => Some(Width::Quad),
            (_, None) => None,
            (_, Some(_)) => {
                return Err(AssemblerError::UnknownMnemonic { line, name });
            }
        };

        let ready = |inst| Ok(ProtoInstruction::Ready(inst));

        match opcode {
            Opcode::Nop => ready(Instruction::Nop),
            Opcode::Ret => ready(Instruction::Ret),
            Opcode::Syscall => ready(Instruction::Syscall),

            Opcode::Mov => {
                let dst = self.register()?;
                self.expect_comma()?;
                let src = self.register()?;
                ready(Instruction::Mov { dst, src })
            }

            Opcode::Loadi => {
                let dst = self.register()?;
                self.expect_comma()?;
                // Forms: `loadi r, imm`, `loadi r, size, imm`, `loadi r, label`.
                match self.peek() {
                    Token::Identifier(_) => {
                        let addr = self.addr()?;
                        Ok(ProtoInstruction::LoadiAddr { dst, addr })
                    }
                    _ if matches!(self.peek_second(), Token::Comma) => {
                        let size = self.size()?;
                        self.expect_comma()?;
                        let line = self.line();
                        let value = encode_imm(self.number()?, size as usize, line)?;
                        ready(Instruction::Loadi { dst, value })
                    }
                    _ => {
                        let line = self.line();
                        let value = encode_imm(self.number()?, dst.bytecount(), line)?;
                        ready(Instruction::Loadi { dst, value })
                    }
                }
            }

            Opcode::Rst => {
                let dst = self.register()?;
                ready(Instruction::Rst { dst })
            }

            Opcode::Push => {
                // Forms: `push[.sfx] imm`, `push size, imm`.
                if matches!(self.peek_second(), Token::Comma) && suffix.is_none() {
                    let size = self.size()?;
                    self.expect_comma()?;
                    let line = self.line();
                    let value = encode_imm(self.number()?, size as usize, line)?;
                    ready(Instruction::Push { value })
                } else {
                    let width = push_width.unwrap_or(Width::Quad);
                    let line = self.line();
                    let value = encode_imm(self.number()?, width.bytes(), line)?;
                    ready(Instruction::Push { value })
                }
            }

            Opcode::Rpush => {
                let src = self.register()?;
                ready(Instruction::Rpush { src })
            }

            Opcode::Rpop => {
                let dst = self.register()?;
                let size = if matches!(self.peek(), Token::Comma) {
                    self.bump();
                    self.size()?
                } else {
                    dst.bytecount() as u32
                };
                ready(Instruction::Rpop { dst, size })
            }

            Opcode::Load => {
                let dst = self.register()?;
                self.expect_comma()?;
                // `load r, off` sizes the access by the register width;
                // `load r, size, off` is explicit.
                let first = self.offset()?;
                if matches!(self.peek(), Token::Comma) {
                    self.bump();
                    let offset = self.offset()?;
                    let size = u32::try_from(first).map_err(|_| {
                        AssemblerError::ValueRange { line, value: first as i128, width: 4 }
                    })?;
                    ready(Instruction::Load { dst, size, offset })
                } else {
                    ready(Instruction::Load {
                        dst,
                        size: dst.bytecount() as u32,
                        offset: first,
                    })
                }
            }

            Opcode::Loadr => {
                let dst = self.register()?;
                self.expect_comma()?;
                // `loadr r, roff` or `loadr r, size, roff`.
                if matches!(self.peek(), Token::Number(_)) {
                    let size = self.size()?;
                    self.expect_comma()?;
                    let offset = self.register()?;
                    ready(Instruction::Loadr { dst, size, offset })
                } else {
                    let offset = self.register()?;
                    ready(Instruction::Loadr {
                        dst,
                        size: dst.bytecount() as u32,
                        offset,
                    })
                }
            }

            Opcode::Loads => {
                let size = self.size()?;
                self.expect_comma()?;
                let offset = self.offset()?;
                ready(Instruction::Loads { size, offset })
            }

            Opcode::Loadsr => {
                let size = self.size()?;
                self.expect_comma()?;
                let offset = self.register()?;
                ready(Instruction::Loadsr { size, offset })
            }

            Opcode::Store => {
                let offset = self.offset()?;
                self.expect_comma()?;
                let src = self.register()?;
                ready(Instruction::Store { offset, src })
            }

            Opcode::Read => {
                let dst = self.register()?;
                self.expect_comma()?;
                let addr = self.register()?;
                ready(Instruction::Read { dst, addr })
            }

            Opcode::Readc => {
                let dst = self.register()?;
                self.expect_comma()?;
                let addr = self.addr()?;
                Ok(ProtoInstruction::Readc { dst, addr })
            }

            Opcode::Reads => {
                let size = self.size()?;
                self.expect_comma()?;
                let addr = self.register()?;
                ready(Instruction::Reads { size, addr })
            }

            Opcode::Readcs => {
                let size = self.size()?;
                self.expect_comma()?;
                let addr = self.addr()?;
                Ok(ProtoInstruction::Readcs { size, addr })
            }

            Opcode::Write => {
                let dst = self.register()?;
                self.expect_comma()?;
                let src = self.register()?;
                ready(Instruction::Write { dst, src })
            }

            Opcode::Writec => {
                let addr = self.addr()?;
                self.expect_comma()?;
                let src = self.register()?;
                Ok(ProtoInstruction::Writec { addr, src })
            }

            Opcode::Writes => {
                let dst = self.register()?;
                self.expect_comma()?;
                let size = self.size()?;
                ready(Instruction::Writes { dst, size })
            }

            Opcode::Writecs => {
                let addr = self.addr()?;
                self.expect_comma()?;
                let size = self.size()?;
                Ok(ProtoInstruction::Writecs { addr, size })
            }

            Opcode::Copy => {
                let dst = self.register()?;
                self.expect_comma()?;
                let size = self.size()?;
                self.expect_comma()?;
                let src = self.register()?;
                ready(Instruction::Copy { dst, size, src })
            }

            Opcode::Copyc => {
                let dst = self.addr()?;
                self.expect_comma()?;
                let size = self.size()?;
                self.expect_comma()?;
                let src = self.addr()?;
                Ok(ProtoInstruction::Copyc { dst, size, src })
            }

            Opcode::Jmp => Ok(ProtoInstruction::Jmp(self.addr()?)),
            Opcode::Jz => Ok(ProtoInstruction::Jz(self.addr()?)),
            Opcode::Call => Ok(ProtoInstruction::Call(self.addr()?)),

            Opcode::Jmpr => {
                let addr = self.register()?;
                ready(Instruction::Jmpr { addr })
            }
            Opcode::Jzr => {
                let addr = self.register()?;
                ready(Instruction::Jzr { addr })
            }
            Opcode::Callr => {
                let addr = self.register()?;
                ready(Instruction::Callr { addr })
            }
        }
    }
}
