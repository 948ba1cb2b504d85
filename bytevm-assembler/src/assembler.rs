//! Two-pass assembly driver.
//!
//! Pass one sizes every instruction (possible before label resolution,
//! since address operands are always 8 bytes) and assigns label addresses.
//! Pass two resolves labels, encodes, and lays the chunks out into a flat
//! image, one load-table segment per `.org` region.

use crate::encoder::encode_into;
use crate::error::{AssemblerError, Result};
use crate::lexer::Lexer;
use crate::parser::{Parser, Stmt, StmtKind};
use bytevm_spec::{Image, Segment};
use std::collections::HashMap;

/// A contiguous run of output bytes starting at a fixed address.
struct Chunk {
    target: u64,
    bytes: Vec<u8>,
}

/// Assemble source text into an executable image.
pub fn assemble(source: &str) -> Result<Image> {
    let tokens = Lexer::new(source).tokenize()?;
    let stmts = Parser::new(tokens).parse_program()?;

    let labels = collect_labels(&stmts)?;

    // Pass two: encode into per-.org chunks.
    let mut chunks = vec![Chunk { target: 0, bytes: Vec::new() }];
    for stmt in stmts {
        match stmt.kind {
            StmtKind::Label(_) => {}
            StmtKind::Org(target) => chunks.push(Chunk { target, bytes: Vec::new() }),
            StmtKind::Bytes(bytes) => {
                chunks.last_mut().unwrap().bytes.extend_from_slice(&bytes)
            }
            StmtKind::Inst(proto) => {
                let inst = proto.resolve(&labels, stmt.line)?;
                encode_into(&inst, &mut chunks.last_mut().unwrap().bytes);
            }
        }
    }
    chunks.retain(|chunk| !chunk.bytes.is_empty());

    // Lay the chunks out flat. Later chunks win where regions collide;
    // the collision itself is only a diagnostic.
    let image_len = chunks
        .iter()
        .map(|chunk| chunk.target as usize + chunk.bytes.len())
        .max()
        .unwrap_or(0);
    let mut bytes = vec![0u8; image_len];
    let mut load_table = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let start = chunk.target as usize;
        bytes[start..start + chunk.bytes.len()].copy_from_slice(&chunk.bytes);
        load_table.push(Segment {
            file_offset: chunk.target as u32,
            size: chunk.bytes.len() as u32,
            target_address: chunk.target,
        });
    }

    let image = Image::with_load_table(bytes, load_table);
    if let Some((a, b)) = image.overlapping_segments() {
        tracing::warn!(
            first = format_args!("{:#x}+{}", a.target_address, a.size),
            second = format_args!("{:#x}+{}", b.target_address, b.size),
            "load table segments overlap"
        );
    }

    Ok(image)
}

/// Pass one: walk the statements, tracking the output address, and record
/// each label's address.
fn collect_labels(stmts: &[Stmt]) -> Result<HashMap<String, u64>> {
    let mut labels = HashMap::new();
    let mut address = 0u64;

    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Label(name) => {
                if labels.insert(name.clone(), address).is_some() {
                    return Err(AssemblerError::DuplicateLabel {
                        line: stmt.line,
                        name: name.clone(),
                    });
                }
            }
            StmtKind::Org(target) => address = *target,
            StmtKind::Bytes(bytes) => address += bytes.len() as u64,
            StmtKind::Inst(proto) => address += proto.encoded_len(),
        }
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytevm_spec::{Instruction, Reg};

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; fall off into the exit sequence
            nop
            push.b 0
            push.h 0
            syscall
        "#;

        let image = assemble(source).unwrap();
        // nop(1) + push.b(6) + push.h(7) + syscall(1)
        assert_eq!(image.len(), 15);
        assert_eq!(image.load_table.len(), 1);
    }

    #[test]
    fn test_labels_resolve_forward_and_back() {
        let source = r#"
        start:
            jmp end
        mid:
            nop
            jmp start
        end:
            jmp mid
        "#;

        let image = assemble(source).unwrap();
        let decoded: Vec<Instruction> = bytevm_disassembler::decode_all(&image.bytes)
            .unwrap()
            .into_iter()
            .map(|(_, inst)| inst)
            .collect();

        // start=0, mid=9, end=19
        assert_eq!(decoded[0], Instruction::Jmp { addr: 19 });
        assert_eq!(decoded[1], Instruction::Nop);
        assert_eq!(decoded[2], Instruction::Jmp { addr: 0 });
        assert_eq!(decoded[3], Instruction::Jmp { addr: 9 });
    }

    #[test]
    fn test_label_in_data_position() {
        let source = r#"
            readc r0.q, value
            jmp 0
        value:
            .quad 0x1122334455667788
        "#;

        let image = assemble(source).unwrap();
        let (inst, _) = bytevm_disassembler::decode(&image.bytes, 0).unwrap();
        // readc(10) + jmp(9) puts the data at 19.
        assert_eq!(inst, Instruction::Readc { dst: Reg::R0, addr: 19 });
        assert_eq!(&image.bytes[19..27], &0x1122334455667788u64.to_le_bytes());
    }

    #[test]
    fn test_org_creates_segments() {
        let source = r#"
            nop
            .org 0x20
        data:
            .byte 1, 2, 3
        "#;

        let image = assemble(source).unwrap();
        assert_eq!(image.load_table.len(), 2);
        assert_eq!(image.load_table[1].target_address, 0x20);
        assert_eq!(image.len(), 0x23);
        assert_eq!(&image.bytes[0x20..0x23], &[1, 2, 3]);
    }

    #[test]
    fn test_unknown_label() {
        let err = assemble("jmp nowhere").unwrap_err();
        assert_eq!(
            err,
            AssemblerError::UnknownLabel { line: 1, name: "nowhere".into() }
        );
    }

    #[test]
    fn test_duplicate_label() {
        let err = assemble("a:\na:\n nop").unwrap_err();
        assert_eq!(err, AssemblerError::DuplicateLabel { line: 2, name: "a".into() });
    }
}
