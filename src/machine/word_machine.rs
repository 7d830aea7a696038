//! Deterministic word machine backing the session service.
//!
//! A minimal word-addressed machine: eight general registers, a program
//! counter, a cycle counter, a halt flag, and an external output word.
//! Memory lives under a word-granular Merkle tree so every observation
//! and mutation of a step can be proved against the tree root. The
//! machine is a pure function of its state: identical state yields
//! byte-identical step logs, including all hashes.

use crate::config::{MachineConfig, NUM_REGISTERS, WORD_LOG2_SIZE};
use crate::machine::merkle::WordMerkleTree;
use crate::machine::MachineDriver;
use crate::models::access_log::{AccessLog, AccessOperation, WordAccess};
use crate::{AppError, Result};

/// Halt the machine.
pub const OP_HALT: u64 = 0;
/// Load a memory word into a register.
pub const OP_LOAD: u64 = 1;
/// Store a register into a memory word.
pub const OP_STORE: u64 = 2;
/// Add two registers into a destination register.
pub const OP_ADD: u64 = 3;
/// Jump to a word address.
pub const OP_JUMP: u64 = 4;
/// Copy a register to the external output word.
pub const OP_OUT: u64 = 5;

/// Encode an instruction word.
///
/// Layout: opcode in bits 0..8, `rd` in 8..16, `rs1` in 16..24, `rs2` in
/// 24..32, word-index operand in 32..56.
#[must_use]
pub fn encode(opcode: u64, rd: u64, rs1: u64, rs2: u64, addr: u64) -> u64 {
    opcode | (rd << 8) | (rs1 << 16) | (rs2 << 24) | (addr << 32)
}

/// `load rd, [addr]`
#[must_use]
pub fn load(rd: u64, addr: u64) -> u64 {
    encode(OP_LOAD, rd, 0, 0, addr)
}

/// `store [addr], rs1`
#[must_use]
pub fn store(addr: u64, rs1: u64) -> u64 {
    encode(OP_STORE, 0, rs1, 0, addr)
}

/// `add rd, rs1, rs2`
#[must_use]
pub fn add(rd: u64, rs1: u64, rs2: u64) -> u64 {
    encode(OP_ADD, rd, rs1, rs2, 0)
}

/// `jump addr`
#[must_use]
pub fn jump(addr: u64) -> u64 {
    encode(OP_JUMP, 0, 0, 0, addr)
}

/// `out rs1`
#[must_use]
pub fn out(rs1: u64) -> u64 {
    encode(OP_OUT, 0, rs1, 0, 0)
}

/// `halt`
#[must_use]
pub fn halt() -> u64 {
    encode(OP_HALT, 0, 0, 0, 0)
}

/// Deterministic reference machine with Merkle-proved memory.
#[derive(Debug, Clone)]
pub struct WordMachine {
    memory: Vec<u64>,
    tree: WordMerkleTree,
    x: [u64; NUM_REGISTERS],
    pc: u64,
    cycle: u64,
    output: u64,
    halted: bool,
    memory_log2_size: u8,
}

impl WordMachine {
    /// Construct a machine from its config.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the config fails validation.
    pub fn new(config: &MachineConfig) -> Result<Self> {
        config.validate()?;
        let mut memory = vec![0u64; config.word_count()];
        memory[..config.program.len()].copy_from_slice(&config.program);
        let tree = WordMerkleTree::new(&memory, WORD_LOG2_SIZE);
        let mut x = [0u64; NUM_REGISTERS];
        x[..config.registers.len()].copy_from_slice(&config.registers);
        Ok(Self {
            memory,
            tree,
            x,
            pc: config.entry_point,
            cycle: 0,
            output: 0,
            halted: false,
            memory_log2_size: config.memory_log2_size,
        })
    }

    /// Current Merkle root over memory.
    #[must_use]
    pub fn root_hash(&self) -> crate::models::proof::Hash {
        self.tree.root()
    }

    fn word_count(&self) -> u64 {
        1 << (self.memory_log2_size - WORD_LOG2_SIZE)
    }

    fn read_word_logged(&self, index: usize, log: &mut AccessLog) -> u64 {
        let value = self.memory[index];
        log.accesses.push(WordAccess {
            operation: AccessOperation::Read,
            read: value,
            written: value,
            proof: self.tree.proof(index),
        });
        value
    }

    fn write_word_logged(&mut self, index: usize, value: u64, log: &mut AccessLog) {
        let before = self.memory[index];
        self.memory[index] = value;
        self.tree.update_word(index, value);
        // Proof is taken after the update: target is the new leaf, root
        // is the tree root after the access.
        log.accesses.push(WordAccess {
            operation: AccessOperation::Write,
            read: before,
            written: value,
            proof: self.tree.proof(index),
        });
    }

    fn check_addr(&self, addr: u64, pc: u64) -> Result<usize> {
        if addr >= self.word_count() {
            return Err(AppError::Machine(format!(
                "word address {addr:#x} out of range at pc {pc:#x}"
            )));
        }
        Ok(addr as usize)
    }

    /// Execute one instruction, recording every memory observation and
    /// mutation into `log`.
    fn exec_one(&mut self, log: &mut AccessLog) -> Result<()> {
        let pc = self.pc;
        let pc_index = (pc >> WORD_LOG2_SIZE) as usize % self.memory.len();

        log.begin("fetch");
        let insn = self.read_word_logged(pc_index, log);
        log.end("fetch");

        let opcode = insn & 0xff;
        let rd = ((insn >> 8) & 0x07) as usize;
        let rs1 = ((insn >> 16) & 0x07) as usize;
        let rs2 = ((insn >> 24) & 0x07) as usize;
        let addr = (insn >> 32) & 0x00ff_ffff;

        let mut next_pc = (pc + (1 << WORD_LOG2_SIZE)) % (1 << self.memory_log2_size);

        log.begin("execute");
        match opcode {
            OP_HALT => {
                self.halted = true;
                next_pc = pc;
                log.note("halt");
            }
            OP_LOAD => {
                let index = self.check_addr(addr, pc)?;
                self.x[rd] = self.read_word_logged(index, log);
            }
            OP_STORE => {
                let index = self.check_addr(addr, pc)?;
                self.write_word_logged(index, self.x[rs1], log);
            }
            OP_ADD => {
                self.x[rd] = self.x[rs1].wrapping_add(self.x[rs2]);
            }
            OP_JUMP => {
                let index = self.check_addr(addr, pc)?;
                next_pc = (index as u64) << WORD_LOG2_SIZE;
            }
            OP_OUT => {
                self.output = self.x[rs1];
                log.note(format!("out {:#x}", self.output));
            }
            other => {
                return Err(AppError::Machine(format!(
                    "invalid opcode {other} at pc {pc:#x}"
                )));
            }
        }
        log.end("execute");

        self.cycle += 1;
        self.pc = next_pc;
        Ok(())
    }
}

impl MachineDriver for WordMachine {
    fn run(&mut self, cycle_limit: u64) -> Result<()> {
        while !self.halted && self.cycle < cycle_limit {
            let mut scratch = AccessLog::default();
            self.exec_one(&mut scratch)?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<AccessLog> {
        let mut log = AccessLog::default();
        if self.halted {
            log.note("machine is halted");
            return Ok(log);
        }
        self.exec_one(&mut log)?;
        Ok(log)
    }

    fn read_cycle(&self) -> u64 {
        self.cycle
    }

    fn read_output(&self) -> u64 {
        self.output
    }

    fn read_pc(&self) -> u64 {
        self.pc
    }

    fn read_register(&self, index: usize) -> u64 {
        self.x.get(index).copied().unwrap_or(0)
    }

    fn halted(&self) -> bool {
        self.halted
    }
}
