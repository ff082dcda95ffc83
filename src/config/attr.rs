use super::{Mode, DEFAULT_SAMPLE_FREQ, DEFAULT_TRACEPOINT_SAMPLE_PERIOD};
use crate::count::PerfCounter;
use crate::event::EventTypeAndModifier;
use crate::ffi::{abi as b, Attr};

pub(crate) const DEFAULT_SAMPLE_TYPE: u64 = b::PERF_SAMPLE_IP
    | b::PERF_SAMPLE_TID
    | b::PERF_SAMPLE_TIME
    | b::PERF_SAMPLE_PERIOD
    | b::PERF_SAMPLE_CPU
    | b::PERF_SAMPLE_ID;

pub(crate) fn from(event: &EventTypeAndModifier, mode: Mode) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };

    // event config:

    attr.type_ = event.event_type.ty;
    attr.config = event.event_type.config;

    // count config:

    macro_rules! when {
        ($bool:ident, $flag:ident) => {
            attr.set_flag(b::$flag, event.$bool)
        };
    }
    when!(exclude_user, PERF_ATTR_FLAG_EXCLUDE_USER);
    when!(exclude_kernel, PERF_ATTR_FLAG_EXCLUDE_KERNEL);
    when!(exclude_hv, PERF_ATTR_FLAG_EXCLUDE_HV);
    when!(exclude_host, PERF_ATTR_FLAG_EXCLUDE_HOST);
    when!(exclude_guest, PERF_ATTR_FLAG_EXCLUDE_GUEST);
    attr.set_precise_ip(event.precise_ip);

    attr.read_format = PerfCounter::READ_FORMAT;

    // sample config:

    let tracepoint = attr.type_ == b::PERF_TYPE_TRACEPOINT;
    attr.sample_type = DEFAULT_SAMPLE_TYPE;
    if tracepoint {
        attr.sample_type |= b::PERF_SAMPLE_RAW;
    }

    if mode == Mode::Sample {
        if tracepoint {
            attr.sample_period_or_freq = DEFAULT_TRACEPOINT_SAMPLE_PERIOD;
        } else {
            attr.set_flag(b::PERF_ATTR_FLAG_FREQ, true);
            attr.sample_period_or_freq = DEFAULT_SAMPLE_FREQ;
        }
    }

    attr
}

/// User registers needed to unwind a call chain from a dumped stack.
pub(crate) fn dwarf_regs_mask() -> u64 {
    #[cfg(target_arch = "x86_64")]
    let mask = 0xff0fff;
    #[cfg(target_arch = "x86")]
    let mask = 0x0fff;
    #[cfg(target_arch = "aarch64")]
    let mask = (1 << 33) - 1;
    #[cfg(target_arch = "arm")]
    let mask = (1 << 16) - 1;
    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        target_arch = "aarch64",
        target_arch = "arm"
    )))]
    let mask = 0;
    mask
}

fn trial(ty: u32, config: u64) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        type_: ty,
        config,
        sample_type: DEFAULT_SAMPLE_TYPE,
        ..Default::default()
    };
    attr.set_flag(b::PERF_ATTR_FLAG_DISABLED, true);
    attr.set_flag(b::PERF_ATTR_FLAG_FREQ, true);
    attr.sample_period_or_freq = DEFAULT_SAMPLE_FREQ;
    attr
}

/// A cpu-cycles sampler with an any-branch stack, opened once to see
/// whether the hardware records taken branches.
pub(crate) fn branch_trial() -> Attr {
    let mut attr = trial(b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CPU_CYCLES);
    attr.sample_type |= b::PERF_SAMPLE_BRANCH_STACK;
    attr.branch_sample_type = b::PERF_SAMPLE_BRANCH_ANY;
    attr
}

/// A cpu-clock sampler dumping user registers and stack, opened once to see
/// whether the kernel supports dwarf call chains.
pub(crate) fn dwarf_trial() -> Attr {
    let mut attr = trial(b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_CPU_CLOCK);
    attr.sample_type |=
        b::PERF_SAMPLE_CALLCHAIN | b::PERF_SAMPLE_REGS_USER | b::PERF_SAMPLE_STACK_USER;
    attr.set_flag(b::PERF_ATTR_FLAG_EXCLUDE_CALLCHAIN_USER, true);
    attr.sample_regs_user = dwarf_regs_mask();
    attr.sample_stack_user = 8192;
    attr
}
