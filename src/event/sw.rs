use crate::ffi::abi as b;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Software {
    CpuClock,
    TaskClock,

    PageFault,
    MinorPageFault,
    MajorPageFault,

    EmuFault,
    AlignFault,

    CtxSwitch,
    CgroupSwitch,

    Dummy,
    BpfOutput,
    CpuMigration,
}

const NAMES: [(&str, Software); 12] = [
    ("cpu-clock", Software::CpuClock),
    ("task-clock", Software::TaskClock),
    ("page-faults", Software::PageFault),
    ("minor-faults", Software::MinorPageFault),
    ("major-faults", Software::MajorPageFault),
    ("emulation-faults", Software::EmuFault),
    ("alignment-faults", Software::AlignFault),
    ("context-switches", Software::CtxSwitch),
    ("cgroup-switches", Software::CgroupSwitch),
    ("dummy", Software::Dummy),
    ("bpf-output", Software::BpfOutput),
    ("cpu-migrations", Software::CpuMigration),
];

impl Software {
    pub fn from_name(name: &str) -> Option<Self> {
        NAMES.iter().find(|(it, _)| *it == name).map(|(_, sw)| *sw)
    }
}

super::event_type!(Software, value, {
    let config = match value {
        Software::CpuClock => b::PERF_COUNT_SW_CPU_CLOCK,
        Software::TaskClock => b::PERF_COUNT_SW_TASK_CLOCK,

        Software::PageFault => b::PERF_COUNT_SW_PAGE_FAULTS,
        Software::MinorPageFault => b::PERF_COUNT_SW_PAGE_FAULTS_MIN,
        Software::MajorPageFault => b::PERF_COUNT_SW_PAGE_FAULTS_MAJ,

        Software::EmuFault => b::PERF_COUNT_SW_EMULATION_FAULTS,
        Software::AlignFault => b::PERF_COUNT_SW_ALIGNMENT_FAULTS,

        Software::CtxSwitch => b::PERF_COUNT_SW_CONTEXT_SWITCHES,
        Software::CgroupSwitch => b::PERF_COUNT_SW_CGROUP_SWITCHES,

        Software::Dummy => b::PERF_COUNT_SW_DUMMY,
        Software::BpfOutput => b::PERF_COUNT_SW_BPF_OUTPUT,
        Software::CpuMigration => b::PERF_COUNT_SW_CPU_MIGRATIONS,
    };

    (b::PERF_TYPE_SOFTWARE, config)
});
