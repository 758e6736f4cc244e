// ==========================================
// 损耗根因推理引擎 - 领域类型定义
// ==========================================
// 红线: 封闭枚举,不做字符串分发
// 序列化格式: snake_case (与前端/数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 损耗事件生命周期状态 (Waste Event Status)
// ==========================================
// 状态机: pending → analyzing → analyzed → verified → closed
// 附加边: pending|analyzed → closed, analyzed → analyzing (重新分析)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteEventStatus {
    Pending,   // 已上报,待分析
    Analyzing, // 分析中 (单飞互斥)
    Analyzed,  // 已分析,待人工核实
    Verified,  // 人工已核实
    Closed,    // 已关闭 (终态)
}

impl WasteEventStatus {
    /// 转换为数据库存储的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteEventStatus::Pending => "pending",
            WasteEventStatus::Analyzing => "analyzing",
            WasteEventStatus::Analyzed => "analyzed",
            WasteEventStatus::Verified => "verified",
            WasteEventStatus::Closed => "closed",
        }
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(WasteEventStatus::Pending),
            "analyzing" => Some(WasteEventStatus::Analyzing),
            "analyzed" => Some(WasteEventStatus::Analyzed),
            "verified" => Some(WasteEventStatus::Verified),
            "closed" => Some(WasteEventStatus::Closed),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, WasteEventStatus::Closed)
    }
}

impl fmt::Display for WasteEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 损耗事件类型 (Waste Event Type)
// ==========================================
// 来源: POS/库存子系统上报时的事件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteEventType {
    CookingLoss,   // 烹饪损耗
    Spoilage,      // 变质报废
    OverPrep,      // 过量备料
    DropDamage,    // 跌落/破损
    QualityReject, // 质量退回
    TransferLoss,  // 调拨损耗
    Unknown,       // 未分类
}

impl WasteEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteEventType::CookingLoss => "cooking_loss",
            WasteEventType::Spoilage => "spoilage",
            WasteEventType::OverPrep => "over_prep",
            WasteEventType::DropDamage => "drop_damage",
            WasteEventType::QualityReject => "quality_reject",
            WasteEventType::TransferLoss => "transfer_loss",
            WasteEventType::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cooking_loss" => WasteEventType::CookingLoss,
            "spoilage" => WasteEventType::Spoilage,
            "over_prep" => WasteEventType::OverPrep,
            "drop_damage" => WasteEventType::DropDamage,
            "quality_reject" => WasteEventType::QualityReject,
            "transfer_loss" => WasteEventType::TransferLoss,
            _ => WasteEventType::Unknown, // 默认值
        }
    }
}

impl fmt::Display for WasteEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 证据维度 (Evidence Kind)
// ==========================================
// 四个独立采集器各产出一类证据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    InventoryVariance, // 库存盘点差异
    BomDeviation,      // BOM 理论消耗偏差
    TimeWindowStaff,   // 时间窗口在岗人员
    SupplierBatch,     // 供应商批次质量
}

impl EvidenceKind {
    /// 全部证据维度 (固定顺序,保证推理可复现)
    pub const ALL: [EvidenceKind; 4] = [
        EvidenceKind::InventoryVariance,
        EvidenceKind::BomDeviation,
        EvidenceKind::TimeWindowStaff,
        EvidenceKind::SupplierBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::InventoryVariance => "inventory_variance",
            EvidenceKind::BomDeviation => "bom_deviation",
            EvidenceKind::TimeWindowStaff => "time_window_staff",
            EvidenceKind::SupplierBatch => "supplier_batch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inventory_variance" => Some(EvidenceKind::InventoryVariance),
            "bom_deviation" => Some(EvidenceKind::BomDeviation),
            "time_window_staff" => Some(EvidenceKind::TimeWindowStaff),
            "supplier_batch" => Some(EvidenceKind::SupplierBatch),
            _ => None,
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 根因维度 (Root Cause Dimension)
// ==========================================
// 红线: 封闭分类体系,新增证据维度时编译器强制更新映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseDimension {
    StaffError,       // 人员操作失误
    FoodQuality,      // 食材质量问题
    EquipmentFault,   // 设备故障
    ProcessDeviation, // 流程偏差
    SupplyChain,      // 供应链问题
    Unknown,          // 证据不足
}

impl RootCauseDimension {
    /// 可参与排名的根因维度 (不含 Unknown,固定顺序保证可复现)
    pub const RANKABLE: [RootCauseDimension; 5] = [
        RootCauseDimension::StaffError,
        RootCauseDimension::FoodQuality,
        RootCauseDimension::EquipmentFault,
        RootCauseDimension::ProcessDeviation,
        RootCauseDimension::SupplyChain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RootCauseDimension::StaffError => "staff_error",
            RootCauseDimension::FoodQuality => "food_quality",
            RootCauseDimension::EquipmentFault => "equipment_fault",
            RootCauseDimension::ProcessDeviation => "process_deviation",
            RootCauseDimension::SupplyChain => "supply_chain",
            RootCauseDimension::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "staff_error" => Some(RootCauseDimension::StaffError),
            "food_quality" => Some(RootCauseDimension::FoodQuality),
            "equipment_fault" => Some(RootCauseDimension::EquipmentFault),
            "process_deviation" => Some(RootCauseDimension::ProcessDeviation),
            "supply_chain" => Some(RootCauseDimension::SupplyChain),
            "unknown" => Some(RootCauseDimension::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for RootCauseDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// 排序语义 = 维度名字典序 (排名平局规则与 BTreeMap 键序共用)
impl Ord for RootCauseDimension {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for RootCauseDimension {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
