//! Small hand-assembled programs run through a whole session.

use emu::config::EmuConfig;
use emu::cpu::arm7tdmi::HaltState;
use emu::cpu::cpu_modes::Mode;
use emu::cpu::psr::CpuState;
use emu::gba::Gba;
use pretty_assertions::assert_eq;

#[derive(Clone, Copy)]
enum Op {
    Arm(u32),
    Thumb(u16),
    Bytes(&'static [u8]),
    /// Zero fill up to the given ROM offset.
    Org(usize),
}

fn rom(program: &[Op]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for op in program {
        match op {
            Op::Arm(word) => bytes.extend_from_slice(&word.to_le_bytes()),
            Op::Thumb(half) => bytes.extend_from_slice(&half.to_le_bytes()),
            Op::Bytes(data) => bytes.extend_from_slice(data),
            Op::Org(offset) => bytes.resize(*offset, 0),
        }
    }
    bytes
}

fn session(program: &[Op]) -> Gba {
    session_with(EmuConfig::default(), program)
}

fn session_with(config: EmuConfig, program: &[Op]) -> Gba {
    Gba::new(config, rom(program), None).expect("valid ROM")
}

const SUM_ONE_TO_TEN: [Op; 6] = [
    Op::Arm(0xE3A0_0000), // mov r0, #0
    Op::Arm(0xE3A0_100A), // mov r1, #10
    Op::Arm(0xE080_0001), // add r0, r0, r1
    Op::Arm(0xE251_1001), // subs r1, r1, #1
    Op::Arm(0x1AFF_FFFC), // bne 0x08000008
    Op::Arm(0xEAFF_FFFE), // b .
];

#[test]
fn arm_loop_with_condition_codes() {
    let mut gba = session(&SUM_ONE_TO_TEN);
    gba.run_frame();

    let registers = gba.registers();
    assert_eq!(registers[0], 55);
    assert_eq!(registers[1], 0);
    assert!(gba.cpsr().zero);
    assert_eq!(registers[15], 0x0800_0014);
}

#[test]
fn thumb_interworking_long_branch_and_bios_division() {
    let mut gba = session(&[
        Op::Arm(0xE28F_2001), // add r2, pc, #1
        Op::Arm(0xE12F_FF12), // bx r2
        Op::Thumb(0xF000),    // bl 0x08000020
        Op::Thumb(0xF80A),
        Op::Thumb(0x2064), // mov r0, #100
        Op::Thumb(0x2107), // mov r1, #7
        Op::Thumb(0xDF06), // swi Div
        Op::Thumb(0xE7FE), // b .
        Op::Org(0x20),
        Op::Thumb(0x242A), // mov r4, #42
        Op::Thumb(0x4770), // bx lr
    ]);
    gba.run_frame();

    let registers = gba.registers();
    assert_eq!(gba.cpsr().state, CpuState::Thumb);
    assert_eq!(registers[4], 42);
    assert_eq!(registers[14], 0x0800_000D);
    assert_eq!(registers[0], 14);
    assert_eq!(registers[1], 2);
    assert_eq!(registers[3], 14);
    assert_eq!(registers[15], 0x0800_0012);
}

// Shared by the interrupt tests: installs the ARM handler at 0x08000040 in
// the user IRQ vector, enables the VBlank IRQ and sets IME.
const IRQ_SETUP: [Op; 12] = [
    Op::Arm(0xE28F_0038), // add r0, pc, #0x38
    Op::Arm(0xE3A0_1403), // mov r1, #0x03000000
    Op::Arm(0xE281_1C7F), // add r1, r1, #0x7F00
    Op::Arm(0xE581_00FC), // str r0, [r1, #0xFC]
    Op::Arm(0xE3A0_2301), // mov r2, #0x04000000
    Op::Arm(0xE3A0_3008), // mov r3, #8
    Op::Arm(0xE1C2_30B4), // strh r3, [r2, #4]       DISPSTAT: VBlank IRQ
    Op::Arm(0xE3A0_3001), // mov r3, #1
    Op::Arm(0xE282_4C02), // add r4, r2, #0x200
    Op::Arm(0xE1C4_30B0), // strh r3, [r4]           IE = VBlank
    Op::Arm(0xE584_3008), // str r3, [r4, #8]        IME = 1
    Op::Arm(0xE3A0_5000), // mov r5, #0
];

// Counts in r5, acknowledges IF and reports the flag to IntrWait.
const VBLANK_HANDLER: [Op; 9] = [
    Op::Org(0x40),
    Op::Arm(0xE285_5001), // add r5, r5, #1
    Op::Arm(0xE280_1C02), // add r1, r0, #0x200
    Op::Arm(0xE3A0_3001), // mov r3, #1
    Op::Arm(0xE1C1_30B2), // strh r3, [r1, #2]       IF = VBlank
    Op::Arm(0xE3A0_1403), // mov r1, #0x03000000
    Op::Arm(0xE281_1C7F), // add r1, r1, #0x7F00
    Op::Arm(0xE1C1_3FB8), // strh r3, [r1, #0xF8]    BIOS flags
    Op::Arm(0xE12F_FF1E), // bx lr
];

fn irq_program(main_loop: &[Op]) -> Vec<Op> {
    let mut program = Vec::new();
    program.extend(IRQ_SETUP);
    program.extend_from_slice(main_loop);
    program.extend(VBLANK_HANDLER);
    program
}

#[test]
fn vblank_interrupt_runs_the_user_handler_through_the_builtin_dispatcher() {
    let mut gba = session(&irq_program(&[
        Op::Arm(0xEAFF_FFFE), // b .
    ]));
    for _ in 0..3 {
        gba.run_frame();
    }

    assert_eq!(gba.frame(), 3);
    assert_eq!(gba.registers()[5], 3);
    // Back in the main loop with the dispatcher's registers restored.
    assert_eq!(gba.cpsr().mode, Mode::System);
    assert_eq!(gba.registers()[2], 0x0400_0000);
    assert_eq!(gba.bus().interrupt_control.interrupt_request, 0);
}

#[test]
fn vblank_intr_wait_sleeps_between_frames() {
    let mut gba = session(&irq_program(&[
        Op::Arm(0xE3A0_6000), // mov r6, #0
        Op::Arm(0xEF05_0000), // swi VBlankIntrWait
        Op::Arm(0xE286_6001), // add r6, r6, #1
        Op::Arm(0xEAFF_FFFC), // b back to the swi
    ]));

    gba.run(1_000);
    assert_eq!(gba.halt_state(), HaltState::Halted);

    for _ in 0..3 {
        gba.run_frame();
    }
    let registers = gba.registers();
    assert_eq!(registers[5], 3);
    assert_eq!(registers[6], 3);
}

#[test]
fn lz77_service_unpacks_rom_data_into_work_ram() {
    let mut gba = session(&[
        Op::Arm(0xE28F_0018), // add r0, pc, #0x18
        Op::Arm(0xE3A0_1402), // mov r1, #0x02000000
        Op::Arm(0xEF11_0000), // swi LZ77UnCompWram
        Op::Arm(0xEAFF_FFFE), // b .
        Op::Org(0x20),
        Op::Arm(0x0000_0810), // LZ77, 8 bytes
        Op::Bytes(&[0x00]),
        Op::Bytes(b"SATSUMA!"),
    ]);
    gba.run_frame();

    assert!(!gba.is_break_requested());
    assert_eq!(gba.bus().peek_word(0x0200_0000), u32::from_le_bytes(*b"SATS"));
    assert_eq!(gba.bus().peek_word(0x0200_0004), u32::from_le_bytes(*b"UMA!"));
}

#[test]
fn corrupt_lz77_stream_breaks_without_writing() {
    let mut gba = session(&[
        Op::Arm(0xE28F_0018), // add r0, pc, #0x18
        Op::Arm(0xE3A0_1402), // mov r1, #0x02000000
        Op::Arm(0xEF11_0000), // swi LZ77UnCompWram
        Op::Arm(0xEAFF_FFFE), // b .
        Op::Org(0x20),
        Op::Arm(0x0000_0410),
        Op::Bytes(&[0x80, 0x00, 0x05]), // reference before the output start
    ]);
    gba.run_frame();

    assert!(gba.is_break_requested());
    assert_eq!(gba.bus().peek_word(0x0200_0000), 0);
    assert_eq!(gba.registers()[15], 0x0800_000C);
}

#[test]
fn unknown_service_breaks_and_resumes() {
    let mut gba = session(&[
        Op::Arm(0xEF42_0000), // swi 0x42
        Op::Arm(0xE3A0_7001), // mov r7, #1
        Op::Arm(0xEAFF_FFFE), // b .
    ]);

    gba.run_frame();
    assert!(gba.is_break_requested());
    assert_eq!(gba.registers()[7], 0);
    assert_eq!(gba.registers()[15], 0x0800_0004);
    assert!(gba.residual_clocks() > 0);

    gba.run_frame();
    assert!(!gba.is_break_requested());
    assert_eq!(gba.registers()[7], 1);
}

#[test]
fn swi_without_emulation_goes_through_the_vector() {
    let config = EmuConfig {
        hle_bios: false,
        ..EmuConfig::default()
    };
    let mut gba = session_with(
        config,
        &[
            Op::Arm(0xE3A0_0005), // mov r0, #5
            Op::Arm(0xE3A0_1002), // mov r1, #2
            Op::Arm(0xEF06_0000), // swi Div
            Op::Arm(0xE3A0_2001), // mov r2, #1
            Op::Arm(0xEAFF_FFFE), // b .
        ],
    );
    gba.run_frame();

    let registers = gba.registers();
    // The built-in vector returns at once, so nothing was divided.
    assert_eq!(registers[0], 5);
    assert_eq!(registers[2], 1);
    assert_eq!(gba.cpsr().mode, Mode::System);
}

#[test]
fn breakpoint_and_single_step() {
    let mut gba = session(&SUM_ONE_TO_TEN);
    gba.add_breakpoint(0x0800_0014);
    assert_eq!(gba.breakpoints().collect::<Vec<_>>(), [0x0800_0014]);

    gba.run_frame();
    assert!(gba.is_break_requested());
    assert_eq!(gba.registers()[0], 55);
    assert_eq!(gba.registers()[15], 0x0800_0014);
    assert_eq!(gba.next_instruction(), "B #-8");

    let clocks = gba.step_instruction();
    assert!(clocks > 0);
    assert_eq!(gba.cpu().current_address, 0x0800_0014);

    assert!(gba.remove_breakpoint(0x0800_0014));
    gba.run_frame();
    assert!(!gba.is_break_requested());
}

#[test]
fn frame_budgets_stay_exact_over_many_calls() {
    let mut gba = session(&SUM_ONE_TO_TEN);
    let mut executed = 0_i64;
    for _ in 0..10 {
        executed += gba.run_frame() as i64;
    }
    assert_eq!(executed, 10 * 280_896 - gba.residual_clocks());
    assert_eq!(gba.frame(), 10);
}
