use criterion::{Criterion, criterion_group, criterion_main};
use domain::{LendingStore, NewBook, NewReturnRequest, Role, UnitOfWork, User, UserDirectory};
use engine::{LifecycleEngine, NoopPublisher};
use lending_store::InMemoryLendingStore;

fn bench_borrow_return_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLendingStore::new();
    let engine = LifecycleEngine::new(store.clone(), NoopPublisher);
    let student = User::new("Bench Student", None, Role::Student);
    let librarian = User::new("Bench Librarian", None, Role::Librarian);

    let book_id = rt.block_on(async {
        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&student).await.unwrap();
        uow.insert_user(&librarian).await.unwrap();
        uow.commit().await.unwrap();
        engine
            .add_book(librarian.id, NewBook::new("Bench", "Author", 1))
            .await
            .unwrap()
            .id
    });

    c.bench_function("engine/borrow_return_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = engine
                    .create_borrow_request(student.id, book_id)
                    .await
                    .unwrap();
                let approval = engine
                    .approve_borrow_request(request.id, librarian.id)
                    .await
                    .unwrap();
                let ret = engine
                    .create_return_request(
                        student.id,
                        NewReturnRequest {
                            transaction_id: approval.transaction.id,
                            book_id,
                        },
                    )
                    .await
                    .unwrap();
                engine
                    .approve_return_request(ret.id, librarian.id)
                    .await
                    .unwrap()
            })
        });
    });
}

fn bench_create_and_reject(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLendingStore::new();
    let engine = LifecycleEngine::new(store.clone(), NoopPublisher);
    let student = User::new("Bench Student", None, Role::Student);
    let librarian = User::new("Bench Librarian", None, Role::Librarian);

    let book_id = rt.block_on(async {
        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&student).await.unwrap();
        uow.insert_user(&librarian).await.unwrap();
        uow.commit().await.unwrap();
        engine
            .add_book(librarian.id, NewBook::new("Bench", "Author", 3))
            .await
            .unwrap()
            .id
    });

    c.bench_function("engine/create_and_reject", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = engine
                    .create_borrow_request(student.id, book_id)
                    .await
                    .unwrap();
                engine
                    .reject_borrow_request(request.id, librarian.id, None)
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_borrow_return_cycle, bench_create_and_reject);
criterion_main!(benches);
