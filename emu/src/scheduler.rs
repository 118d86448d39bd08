//! # Scheduler
//!
//! Drives the CPU and the peripherals in lock-step without polling every
//! clock. Each iteration runs one unit of work bounded by the current
//! horizon, tells every peripheral how many clocks went by and takes the
//! nearest event they report as the next horizon.
//!
//! ```text
//! available = residual + budget
//!
//! bulk:   while available >= horizon   iterate(horizon)
//! drain:  while available > 0          iterate(available)
//!
//! iterate(limit):
//!   DMA owes clocks        -> stall the CPU for min(owed, limit)
//!   halted, no wake source -> sleep for limit
//!   IRQ pending, I clear   -> enter the IRQ vector (IRQ_DISPATCH_CLOCKS + refill)
//!   otherwise              -> run instructions until limit is spent
//! ```
//!
//! Instructions are not split, so an iteration may overshoot its limit.
//! Whatever is left over (positive after a break, negative after an
//! overshoot) is kept in `residual` and settled by the next call.

use std::collections::BTreeSet;

use crate::bus::Bus;
use crate::cpu::arm7tdmi::{Arm7tdmi, HaltState};

/// Cost of redirecting the CPU to the IRQ vector, before the pipeline
/// refill at the vector.
pub const IRQ_DISPATCH_CLOCKS: u32 = 3;

#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Clocks granted but not yet executed, or executed in advance when
    /// negative.
    residual: i64,
    horizon: u32,
    cpu_step_clocks: u32,

    breakpoints: BTreeSet<u32>,
    /// Breakpoint that stopped the previous run; ignored for one fetch so
    /// execution can move past it.
    resume_at: Option<u32>,
}

impl Scheduler {
    #[must_use]
    pub fn new(cpu_step_clocks: u32) -> Self {
        let cpu_step_clocks = cpu_step_clocks.max(1);
        Self {
            residual: 0,
            horizon: cpu_step_clocks,
            cpu_step_clocks,
            breakpoints: BTreeSet::new(),
            resume_at: None,
        }
    }

    #[must_use]
    pub const fn residual(&self) -> i64 {
        self.residual
    }

    #[must_use]
    pub const fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn add_breakpoint(&mut self, address: u32) {
        self.breakpoints.insert(address);
    }

    /// Returns whether a breakpoint was registered at `address`.
    pub fn remove_breakpoint(&mut self, address: u32) -> bool {
        self.breakpoints.remove(&address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Advances the system by `budget` clocks plus the carried residual.
    /// Returns the clocks actually executed. Stops early, keeping the
    /// remainder, when the CPU's break flag is raised.
    pub fn run(&mut self, cpu: &mut Arm7tdmi, bus: &mut Bus, budget: u32) -> u64 {
        let mut available = self.residual + i64::from(budget);
        let mut executed = 0_u64;

        while available >= i64::from(self.horizon) && !cpu.is_break_requested() {
            let consumed = self.iterate(cpu, bus, self.horizon);
            available -= i64::from(consumed);
            executed += u64::from(consumed);
        }

        while available > 0 && !cpu.is_break_requested() {
            let limit = u32::try_from(available).unwrap_or(u32::MAX);
            let consumed = self.iterate(cpu, bus, limit);
            available -= i64::from(consumed);
            executed += u64::from(consumed);
        }

        self.residual = available;
        executed
    }

    /// Runs a single iteration with the smallest possible limit: one
    /// instruction, one IRQ entry or one DMA/halt slice. A breakpoint at
    /// the current address is stepped over. The clocks are borrowed from
    /// the next [`run`](Self::run) so frame budgets stay exact.
    pub fn step(&mut self, cpu: &mut Arm7tdmi, bus: &mut Bus) -> u32 {
        self.resume_at = Some(cpu.program_counter());
        let consumed = self.iterate(cpu, bus, 1);
        self.residual -= i64::from(consumed);
        consumed
    }

    fn iterate(&mut self, cpu: &mut Arm7tdmi, bus: &mut Bus, limit: u32) -> u32 {
        bus.run_pending_dma();

        let consumed = if bus.dma.busy_clocks > 0 {
            bus.dma.busy_clocks.min(limit)
        } else if !Self::awake(cpu, bus) {
            limit
        } else if bus.interrupt_control.pending() && !cpu.cpsr.irq_disable {
            cpu.service_irq(bus);
            IRQ_DISPATCH_CLOCKS + bus.take_cycles()
        } else {
            self.run_cpu(cpu, bus, limit)
        };

        self.horizon = bus
            .update_peripherals(consumed)
            .min(self.cpu_step_clocks)
            .max(1);
        consumed
    }

    /// Clears the halt state when its wake condition holds.
    fn awake(cpu: &mut Arm7tdmi, bus: &Bus) -> bool {
        let wake = match cpu.halt {
            HaltState::Running => return true,
            HaltState::Halted => bus.interrupt_control.wakes_from_halt(),
            HaltState::Stopped => bus.interrupt_control.wakes_from_stop(),
        };
        if wake {
            tracing::debug!("CPU woken from {:?}", cpu.halt);
            cpu.halt = HaltState::Running;
        }
        wake
    }

    fn run_cpu(&mut self, cpu: &mut Arm7tdmi, bus: &mut Bus, limit: u32) -> u32 {
        let mut clocks = 0;
        while clocks < limit {
            let address = cpu.program_counter();
            if self.resume_at.take() != Some(address) && self.breakpoints.contains(&address) {
                tracing::info!("breakpoint hit at 0x{address:08X}");
                self.resume_at = Some(address);
                cpu.request_break();
                break;
            }

            clocks += cpu.step(bus);

            let irq_ready = bus.interrupt_control.pending() && !cpu.cpsr.irq_disable;
            if bus.take_sync_request()
                || irq_ready
                || cpu.halt != HaltState::Running
                || cpu.is_break_requested()
            {
                break;
            }
        }
        clocks
    }
}
