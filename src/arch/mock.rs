//! Host-side machine used by the test suites.
//!
//! The CPU and the PIC append to one shared [`EventLog`], so tests can
//! assert the order of privileged operations across both. Physical memory
//! is a sparse map of 4 KiB frames that reads as zero until written.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::arch::{Cpu, EntryPoints, InterruptController, Machine, Platform};
use crate::config::{KernelConfig, NUM_TERMINALS, PAGE_SIZE};
use crate::drivers::bootfs::{BootFs, ImageBuilder};
use crate::drivers::line::{Echo, LineDiscipline};
use crate::drivers::{rtc_rate, Console, ConsoleEvent, DriverError, RtcDevice};
use crate::interrupts::idt::DescriptorTablePointer;
use crate::interrupts::{Irq, TrapFrame, SYSCALL_VECTOR};
use crate::kernel::{Kernel, Resume};
use crate::memory::{AccessMode, AddressSpace, PageFault, PhysAddr, PhysicalMemory, TableLocations, VirtAddr};
use crate::terminal::TerminalId;

pub const TABLE_LOCATIONS: TableLocations = TableLocations {
    directory: PhysAddr::new(0x0010_0000),
    low_table: PhysAddr::new(0x0010_1000),
    user_video_table: PhysAddr::new(0x0010_2000),
};

/// Entry stubs are 16 bytes apart from here.
pub const STUB_BASE: u32 = 0x0040_1000;
pub const STUB_STRIDE: u32 = 16;

/// Where the kernel idles before the first program starts.
pub const BOOT_STACK_FRAME: u32 = 0x0050_0000;
/// Distance of a trap frame below the top of the interrupted kernel stack.
pub const FRAME_DEPTH: u32 = 0x44;

/// Entry point of every program in [`default_image`].
pub const PROGRAM_ENTRY: u32 = 0x0804_80E8;
/// eip reported for user traps, just past an `int 0x80`.
pub const USER_EIP: u32 = 0x0804_8200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DisableInterrupts,
    EnableInterrupts,
    Halt,
    PortRead(u16),
    PortWrite(u16, u8),
    LoadDescriptorTable(DescriptorTablePointer),
    LoadPageDirectory(PhysAddr),
    EnablePaging,
    FlushTlb,
    SetKernelStack(u32),
    InitializePic,
    EnableIrq(u8),
    DisableIrq(u8),
    Acknowledge(u8),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Default)]
pub struct MockCpu {
    log: EventLog,
    interrupts: bool,
    port_input: BTreeMap<u16, VecDeque<u8>>,
    fault_address: u32,
    kernel_stack: u32,
}

impl MockCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.snapshot()
    }

    pub fn clear_events(&mut self) {
        self.log.clear();
    }

    /// Bytes returned by later reads of `port`, oldest first.
    pub fn queue_port_input(&mut self, port: u16, bytes: &[u8]) {
        self.port_input.entry(port).or_default().extend(bytes);
    }

    pub fn set_fault_address(&mut self, addr: u32) {
        self.fault_address = addr;
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    pub fn kernel_stack(&self) -> u32 {
        self.kernel_stack
    }
}

impl Cpu for MockCpu {
    fn disable_interrupts(&mut self) {
        self.interrupts = false;
        self.log.push(Event::DisableInterrupts);
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
        self.log.push(Event::EnableInterrupts);
    }

    fn halt(&mut self) {
        self.log.push(Event::Halt);
    }

    fn read_port(&mut self, port: u16) -> u8 {
        self.log.push(Event::PortRead(port));
        self.port_input
            .get_mut(&port)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0)
    }

    fn write_port(&mut self, port: u16, value: u8) {
        self.log.push(Event::PortWrite(port, value));
    }

    fn load_descriptor_table(&mut self, pointer: DescriptorTablePointer) {
        self.log.push(Event::LoadDescriptorTable(pointer));
    }

    fn load_page_directory(&mut self, root: PhysAddr) {
        self.log.push(Event::LoadPageDirectory(root));
    }

    fn enable_paging(&mut self) {
        self.log.push(Event::EnablePaging);
    }

    fn flush_tlb(&mut self) {
        self.log.push(Event::FlushTlb);
    }

    fn fault_address(&self) -> VirtAddr {
        VirtAddr::new(self.fault_address)
    }

    fn set_kernel_stack(&mut self, top: u32) {
        self.kernel_stack = top;
        self.log.push(Event::SetKernelStack(top));
    }
}

#[derive(Debug, Default)]
pub struct MockPic {
    log: EventLog,
    enabled: u16,
    acknowledged: Vec<u8>,
}

impl MockPic {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn acknowledgements(&self, line: u8) -> usize {
        self.acknowledged.iter().filter(|&&l| l == line).count()
    }

    pub fn is_enabled(&self, line: u8) -> bool {
        line < 16 && self.enabled & (1 << line) != 0
    }
}

impl InterruptController for MockPic {
    fn initialize(&mut self) {
        self.enabled = 1 << 2;
        self.log.push(Event::InitializePic);
    }

    fn enable_irq(&mut self, line: u8) {
        if line < 16 {
            self.enabled |= 1 << line;
        }
        self.log.push(Event::EnableIrq(line));
    }

    fn disable_irq(&mut self, line: u8) {
        if line < 16 {
            self.enabled &= !(1 << line);
        }
        self.log.push(Event::DisableIrq(line));
    }

    fn acknowledge(&mut self, line: u8) {
        self.acknowledged.push(line);
        self.log.push(Event::Acknowledge(line));
    }
}

#[derive(Debug, Default, Clone)]
pub struct SparseMemory {
    frames: BTreeMap<u32, Box<[u8; PAGE_SIZE as usize]>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_touched(&self) -> usize {
        self.frames.len()
    }
}

impl PhysicalMemory for SparseMemory {
    fn read(&self, addr: PhysAddr, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = addr.as_u32().wrapping_add(i as u32);
            *byte = self
                .frames
                .get(&(at / PAGE_SIZE))
                .map_or(0, |frame| frame[(at % PAGE_SIZE) as usize]);
        }
    }

    fn write(&mut self, addr: PhysAddr, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let at = addr.as_u32().wrapping_add(i as u32);
            let frame = self
                .frames
                .entry(at / PAGE_SIZE)
                .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
            frame[(at % PAGE_SIZE) as usize] = byte;
        }
    }
}

/// Line discipline plus a transcript of everything shown per terminal.
#[derive(Default)]
pub struct ScriptedConsole {
    input: LineDiscipline,
    output: [Vec<u8>; NUM_TERMINALS],
    focused: Option<TerminalId>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a finished input line on `terminal`.
    pub fn submit(&mut self, terminal: TerminalId, text: &[u8]) {
        self.input.submit(terminal, text);
    }

    pub fn output(&self, terminal: TerminalId) -> &[u8] {
        &self.output[terminal.index()]
    }

    pub fn focused(&self) -> TerminalId {
        self.focused.unwrap_or(TerminalId::FIRST)
    }
}

impl Console for ScriptedConsole {
    fn process_scancode(&mut self, scancode: u8, foreground: TerminalId) -> ConsoleEvent {
        let screen = &mut self.output[foreground.index()];
        match self.input.feed(scancode, foreground) {
            Echo::Byte(byte) => screen.push(byte),
            Echo::Newline => screen.push(b'\n'),
            Echo::Erase => {
                screen.pop();
            }
            Echo::Clear => screen.clear(),
            Echo::Switch(target) => return ConsoleEvent::SwitchTerminal(target),
            Echo::None => {}
        }
        ConsoleEvent::None
    }

    fn read_line(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Option<usize> {
        self.input.read_line(terminal, buf)
    }

    fn write(&mut self, terminal: TerminalId, data: &[u8]) -> usize {
        self.output[terminal.index()].extend_from_slice(data);
        data.len()
    }

    fn focus(&mut self, terminal: TerminalId) {
        self.focused = Some(terminal);
    }
}

#[derive(Debug, Default)]
pub struct CountingRtc {
    opened: bool,
    frequency: u32,
    interrupts: u32,
}

impl CountingRtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }
}

impl RtcDevice for CountingRtc {
    fn open(&mut self) {
        self.opened = true;
        self.frequency = 2;
    }

    fn handle_interrupt(&mut self) {
        self.interrupts = self.interrupts.wrapping_add(1);
    }

    fn interrupts(&self) -> u32 {
        self.interrupts
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), DriverError> {
        rtc_rate(hz).ok_or(DriverError::Unsupported)?;
        self.frequency = hz;
        Ok(())
    }
}

pub struct MockPlatform;

impl Platform for MockPlatform {
    type Cpu = MockCpu;
    type Pic = MockPic;
    type Memory = SparseMemory;
    type Fs = BootFs<Vec<u8>>;
    type Console = ScriptedConsole;
    type Rtc = CountingRtc;

    fn locate_tables(_space: &AddressSpace) -> TableLocations {
        TABLE_LOCATIONS
    }
}

/// A flat executable: ELF magic, entry point at byte 24, then `body`.
pub fn elf_image(entry: u32, body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 28];
    image[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    image[24..28].copy_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(body);
    image
}

pub fn default_image() -> Vec<u8> {
    ImageBuilder::new()
        .directory(".")
        .rtc("rtc")
        .file("shell", &elf_image(PROGRAM_ENTRY, &[0x90; 300]))
        .file("ls", &elf_image(PROGRAM_ENTRY, &[0x90; 100]))
        .file("frame0.txt", b"/\\/\\/\\ fish /\\/\\/\\\n")
        .file("notelf", b"#!/bin/sh\necho no\n")
        .build()
}

pub fn machine_with_image(image: Vec<u8>) -> Machine<MockPlatform> {
    let log = EventLog::new();
    let fs = match BootFs::new(image) {
        Ok(fs) => fs,
        Err(err) => panic!("bad test image: {}", err),
    };
    Machine {
        cpu: MockCpu::with_log(log.clone()),
        pic: MockPic::new(log),
        memory: SparseMemory::new(),
        fs,
        console: ScriptedConsole::new(),
        rtc: CountingRtc::new(),
        entry_points: EntryPoints::uniform(STUB_BASE, STUB_STRIDE),
    }
}

pub fn machine() -> Machine<MockPlatform> {
    machine_with_image(default_image())
}

pub fn kernel_with(config: KernelConfig) -> Kernel<MockPlatform> {
    Kernel::new(machine(), config)
}

pub fn kernel() -> Kernel<MockPlatform> {
    kernel_with(KernelConfig::default())
}

/// A kernel that has run every boot phase.
pub fn booted_kernel() -> Kernel<MockPlatform> {
    let mut kernel = kernel();
    if let Err(err) = kernel.init() {
        panic!("mock boot failed: {}", err);
    }
    kernel
}

/// Where a trap taken now would leave its frame.
pub fn frame_address(kernel: &Kernel<MockPlatform>) -> u32 {
    match kernel.processes().current() {
        Some(pid) => pid.kernel_stack_top() - FRAME_DEPTH,
        None => BOOT_STACK_FRAME,
    }
}

/// One trap together with the frame as the stub would restore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    pub resume: Resume,
    pub frame: TrapFrame,
}

impl Trap {
    /// The value left in eax.
    pub fn result(&self) -> i32 {
        self.frame.eax as i32
    }
}

pub fn trap(kernel: &mut Kernel<MockPlatform>, mut frame: TrapFrame) -> Trap {
    let at = frame_address(kernel);
    let resume = kernel.handle_interrupt(&mut frame, at);
    Trap { resume, frame }
}

/// Deliver `vector` to whatever is running.
pub fn raise(kernel: &mut Kernel<MockPlatform>, vector: u8) -> Resume {
    let from_user = kernel.processes().current().is_some();
    let mut frame = TrapFrame::for_vector(vector, from_user);
    frame.eip = USER_EIP;
    trap(kernel, frame).resume
}

/// `int 0x80` from the running process.
pub fn syscall(kernel: &mut Kernel<MockPlatform>, number: u32, ebx: u32, ecx: u32, edx: u32) -> Trap {
    let mut frame = TrapFrame::for_vector(SYSCALL_VECTOR, true);
    frame.eip = USER_EIP;
    frame.eax = number;
    frame.ebx = ebx;
    frame.ecx = ecx;
    frame.edx = edx;
    trap(kernel, frame)
}

/// Deliver timer interrupts until the scheduler has acted `decisions` times.
pub fn run_decisions(kernel: &mut Kernel<MockPlatform>, decisions: u64) -> Vec<Resume> {
    let divisor = kernel.config().schedule_divisor.max(1);
    let mut decided = Vec::new();
    for _ in 0..decisions * divisor {
        let resume = raise(kernel, Irq::Timer.vector());
        if kernel.scheduler().ticks() % divisor == 0 {
            decided.push(resume);
        }
    }
    decided
}

/// Copy `data` into the running program's memory as a user write would.
pub fn write_user(kernel: &mut Kernel<MockPlatform>, addr: u32, data: &[u8]) -> Result<(), PageFault> {
    kernel.address_space.write_virtual(
        &mut kernel.machine.memory,
        VirtAddr::new(addr),
        data,
        AccessMode::UserWrite,
    )
}

pub fn read_user(kernel: &mut Kernel<MockPlatform>, addr: u32, len: usize) -> Result<Vec<u8>, PageFault> {
    let mut buf = vec![0u8; len];
    kernel.address_space.read_virtual(
        &kernel.machine.memory,
        VirtAddr::new(addr),
        &mut buf,
        AccessMode::UserRead,
    )?;
    Ok(buf)
}

/// Read physical memory directly, bypassing translation.
pub fn read_physical(kernel: &Kernel<MockPlatform>, addr: u32, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    kernel.machine().memory.read(PhysAddr::new(addr), &mut buf);
    buf
}
