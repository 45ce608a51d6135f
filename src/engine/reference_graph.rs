// ==========================================
// 计量计价导入 - 进度号引用图解析
// ==========================================
// 节点: (预算方案 ID, 进度号)
// 边:   引用行 → 目标进度号 × 带符号乘数
// 红线: 循环引用必须报错（CircularReference,携带完整路径）,禁止静默归零
// 红线: 缓存与在途集合按预算方案隔离,不跨方案共享
// ==========================================
// 解析: 显式栈迭代 DFS + 记忆化,环长度不受调用栈限制
// 抵消: |total| <= 1e-12 缓存为 None（与"缺失"同义）
// ==========================================

mod core;


pub use self::core::ReferenceGraph;
