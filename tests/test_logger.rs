mod common;

use std::fs;

use log::Level;
use sugars::{rc, refcell};

use ecosched::core::common::{CpuArch, SlaClass, VmFlavor};
use ecosched::core::config::SchedulerConfig;
use ecosched::core::logger::{FileLogger, Logger};

use common::MockCloud;

#[test]
// Scheduler decisions recorded through a FileLogger serialize to CSV.
fn test_file_logger_records_decisions() {
    use std::cell::RefCell;
    use std::rc::Rc;

    use ecosched::core::cloud_api::CloudApi;
    use ecosched::core::scheduler::Scheduler;

    let mut cloud = MockCloud::new();
    for _ in 0..2 {
        cloud.add_machine(CpuArch::X86, 16, 0);
    }
    let t0 = cloud.add_task(CpuArch::X86, VmFlavor::Linux, 4, SlaClass::Sla0);

    let cloud = rc!(refcell!(cloud));
    let api: Rc<RefCell<dyn CloudApi>> = cloud.clone();
    let logger: Rc<RefCell<Box<dyn Logger>>> = rc!(refcell!(Box::new(FileLogger::with_level(Level::Debug)) as Box<dyn Logger>));
    let mut scheduler = Scheduler::new(api, SchedulerConfig::default()).with_logger(logger.clone());

    scheduler.init();
    scheduler.new_task(1, t0);
    scheduler.memory_warning(2, 0);

    let path = std::env::temp_dir().join("ecosched_test_log.csv");
    let path = path.to_str().unwrap();
    logger.borrow().save_log(path).unwrap();
    let content = fs::read_to_string(path).unwrap();
    assert!(content.contains("scheduler"));
    assert!(content.contains("memory overcommit"));
    fs::remove_file(path).ok();
}

#[test]
// Simulation completion prints the report and shuts every VM down.
fn test_simulation_complete_shuts_down() {
    let mut cloud = MockCloud::new();
    for _ in 0..3 {
        cloud.add_machine(CpuArch::X86, 16, 0);
    }
    cloud.set_sla_report(SlaClass::Sla0, 1.5);
    cloud.set_cluster_energy(42.0);
    let t0 = cloud.add_task(CpuArch::X86, VmFlavor::Linux, 4, SlaClass::Sla1);
    let (cloud, mut scheduler) = common::setup(cloud, SchedulerConfig::default());
    scheduler.new_task(1, t0);

    scheduler.simulation_complete(2_000_000);

    for machine in scheduler.fleet().machines() {
        assert!(cloud.borrow().live_vms_on(machine).is_empty());
    }
    assert_eq!(scheduler.registry().vm_count(), 0);
}
