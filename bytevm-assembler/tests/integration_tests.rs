//! Assembler integration tests: full source programs down to image bytes.

use bytevm_assembler::assemble;
use bytevm_disassembler::decode_all;
use bytevm_spec::{Instruction, Reg, Width};

fn instructions(source: &str) -> Vec<Instruction> {
    let image = assemble(source).expect("assembly failed");
    decode_all(&image.bytes)
        .expect("decode failed")
        .into_iter()
        .map(|(_, inst)| inst)
        .collect()
}

#[test]
fn test_every_mnemonic_assembles() {
    let source = r#"
    top:
        nop
        mov r1.q, r0.q
        loadi r2.w, 7
        rst r2.w
        push.q 1
        rpush ax.q
        rpop r3.q
        load r4.q, -12
        loadr r4.q, 8, r5.q
        loads 8, -12
        loadsr 8, r5.q
        store -12, r4.q
        read r6.q, r7.q
        readc r6.q, top
        reads 4, r7.q
        readcs 4, 0x80
        write r6.q, r7.q
        writec 0x80, r7.q
        writes r6.q, 4
        writecs 0x80, 4
        copy r6.q, 4, r7.q
        copyc 0x80, 4, 0x90
        jmp top
        jmpr r8.q
        jz top
        jzr r8.q
        call top
        callr r8.q
        ret
        syscall
    "#;

    let decoded = instructions(source);
    assert_eq!(decoded.len(), 30);
    assert_eq!(decoded[0], Instruction::Nop);
    assert_eq!(decoded[29], Instruction::Syscall);
}

#[test]
fn test_immediate_widths_follow_register() {
    let decoded = instructions("loadi r0.b, 5\nloadi r1.h, 5\nloadi r2.w, 5\nloadi r3.q, 5");
    let sizes: Vec<usize> = decoded
        .iter()
        .map(|inst| match inst {
            Instruction::Loadi { value, .. } => value.len(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(sizes, vec![1, 2, 4, 8]);
}

#[test]
fn test_natural_width_defaults() {
    let decoded = instructions("rpush flags\nrpush r0\nrpush sp");
    assert_eq!(
        decoded[0],
        Instruction::Rpush { src: Reg::FLAGS }
    );
    assert_eq!(decoded[1], Instruction::Rpush { src: Reg::R0 });
    assert_eq!(decoded[2], Instruction::Rpush { src: Reg::SP });
}

#[test]
fn test_label_addresses_skip_data() {
    let source = r#"
        jmp entry
    table:
        .byte 1, 2, 3, 4, 5
    entry:
        nop
    "#;
    let image = assemble(source).unwrap();
    // jmp is 9 bytes, the table 5, so entry = 14.
    let (inst, _) = bytevm_disassembler::decode(&image.bytes, 0).unwrap();
    assert_eq!(inst, Instruction::Jmp { addr: 14 });
    assert_eq!(&image.bytes[9..14], &[1, 2, 3, 4, 5]);
}

#[test]
fn test_case_of_scratch_registers() {
    let decoded = instructions("mov r63.b, r17.h");
    assert_eq!(
        decoded[0],
        Instruction::Mov {
            dst: Reg::new(63, Width::Byte),
            src: Reg::new(17, Width::Half),
        }
    );
}

#[test]
fn test_comments_and_blank_lines_ignored() {
    let decoded = instructions(
        "\n\n; leading comment\n   # hash comment\nnop ; trailing\n\n\nret\n",
    );
    assert_eq!(decoded, vec![Instruction::Nop, Instruction::Ret]);
}

#[test]
fn test_org_padding_is_zero() {
    let image = assemble("nop\n.org 8\nret").unwrap();
    assert_eq!(image.bytes.len(), 9);
    assert_eq!(image.bytes[0], 0x00);
    assert_eq!(&image.bytes[1..8], &[0; 7]);
    assert_eq!(image.bytes[8], 0x36);
    assert_eq!(image.load_table.len(), 2);
}

#[test]
fn test_loadi_label_materializes_address() {
    let source = r#"
        loadi r0.q, data
        ret
    data:
        .quad 0
    "#;
    let decoded = instructions(source);
    // loadi(14) + ret(1) puts data at 15.
    assert_eq!(
        decoded[0],
        Instruction::Loadi { dst: Reg::R0, value: 15u64.to_le_bytes().to_vec() }
    );
}
