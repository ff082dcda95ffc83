use crate::ffi::abi as b;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hardware {
    CpuCycle,
    BusCycle,
    RefCpuCycle,

    Cache(Type, Op, OpResult),
    CacheMiss,
    CacheAccess,

    BranchMiss,
    BranchInstr,

    BackendStalledCycle,
    FrontendStalledCycle,

    Instr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    L1d,
    L1i,
    Ll,
    Dtlb,
    Itlb,
    Bpu,
    Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    Read,
    Write,
    Prefetch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpResult {
    Miss,
    Access,
}

const GENERIC: [(&str, Hardware); 10] = [
    ("cpu-cycles", Hardware::CpuCycle),
    ("instructions", Hardware::Instr),
    ("cache-references", Hardware::CacheAccess),
    ("cache-misses", Hardware::CacheMiss),
    ("branch-instructions", Hardware::BranchInstr),
    ("branch-misses", Hardware::BranchMiss),
    ("bus-cycles", Hardware::BusCycle),
    ("stalled-cycles-frontend", Hardware::FrontendStalledCycle),
    ("stalled-cycles-backend", Hardware::BackendStalledCycle),
    ("ref-cycles", Hardware::RefCpuCycle),
];

const CACHES: [(&str, Type); 7] = [
    ("L1-dcache", Type::L1d),
    ("L1-icache", Type::L1i),
    ("LLC", Type::Ll),
    ("dTLB", Type::Dtlb),
    ("iTLB", Type::Itlb),
    ("branch", Type::Bpu),
    ("node", Type::Node),
];

const CACHE_OPS: [(&str, Op, OpResult); 6] = [
    ("-loads", Op::Read, OpResult::Access),
    ("-load-misses", Op::Read, OpResult::Miss),
    ("-stores", Op::Write, OpResult::Access),
    ("-store-misses", Op::Write, OpResult::Miss),
    ("-prefetches", Op::Prefetch, OpResult::Access),
    ("-prefetch-misses", Op::Prefetch, OpResult::Miss),
];

impl Hardware {
    /// Looks up a generic hardware event (`cpu-cycles`) or a cache event
    /// spelled `<cache>-<op>[-misses]` (`L1-dcache-load-misses`).
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some((_, hw)) = GENERIC.iter().find(|(it, _)| *it == name) {
            return Some(*hw);
        }
        CACHES.iter().find_map(|(cache, ty)| {
            let op = name.strip_prefix(cache)?;
            CACHE_OPS
                .iter()
                .find(|(it, _, _)| *it == op)
                .map(|(_, op, result)| Hardware::Cache(*ty, *op, *result))
        })
    }
}

super::event_type!(Hardware, value, {
    let config = match value {
        Hardware::CpuCycle => b::PERF_COUNT_HW_CPU_CYCLES,
        Hardware::BusCycle => b::PERF_COUNT_HW_BUS_CYCLES,
        Hardware::RefCpuCycle => b::PERF_COUNT_HW_REF_CPU_CYCLES,

        Hardware::Cache(ty, op, result) => {
            let id = match ty {
                Type::L1d => b::PERF_COUNT_HW_CACHE_L1D,
                Type::L1i => b::PERF_COUNT_HW_CACHE_L1I,
                Type::Ll => b::PERF_COUNT_HW_CACHE_LL,
                Type::Dtlb => b::PERF_COUNT_HW_CACHE_DTLB,
                Type::Itlb => b::PERF_COUNT_HW_CACHE_ITLB,
                Type::Bpu => b::PERF_COUNT_HW_CACHE_BPU,
                Type::Node => b::PERF_COUNT_HW_CACHE_NODE,
            };
            let op = match op {
                Op::Read => b::PERF_COUNT_HW_CACHE_OP_READ,
                Op::Write => b::PERF_COUNT_HW_CACHE_OP_WRITE,
                Op::Prefetch => b::PERF_COUNT_HW_CACHE_OP_PREFETCH,
            };
            let op_result = match result {
                OpResult::Miss => b::PERF_COUNT_HW_CACHE_RESULT_MISS,
                OpResult::Access => b::PERF_COUNT_HW_CACHE_RESULT_ACCESS,
            };
            return (b::PERF_TYPE_HW_CACHE, id | (op << 8) | (op_result << 16));
        }

        Hardware::CacheMiss => b::PERF_COUNT_HW_CACHE_MISSES,
        Hardware::CacheAccess => b::PERF_COUNT_HW_CACHE_REFERENCES,

        Hardware::BranchMiss => b::PERF_COUNT_HW_BRANCH_MISSES,
        Hardware::BranchInstr => b::PERF_COUNT_HW_BRANCH_INSTRUCTIONS,

        Hardware::BackendStalledCycle => b::PERF_COUNT_HW_STALLED_CYCLES_BACKEND,
        Hardware::FrontendStalledCycle => b::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND,

        Hardware::Instr => b::PERF_COUNT_HW_INSTRUCTIONS,
    };

    (b::PERF_TYPE_HARDWARE, config)
});
